use anyhow::{bail, ensure, Result};

use crate::block_file::BlockNr;
use crate::btree::node::Node;
use crate::btree::BTree;

//-------------------------------------------------------------------------

impl BTree {
    /// Removes a key, returning false if it was not present.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let Some(root_loc) = self.root else {
            return Ok(false);
        };

        let mut root = self.read_node(root_loc)?;
        if !self.remove_from_(&mut root, key)? {
            return Ok(false);
        }

        if root.nr_keys() == 0 {
            // Root collapse: an empty leaf means the tree is empty, an
            // empty internal root hands over to its only child.
            self.root = match &root {
                Node::Leaf { .. } => None,
                Node::Internal { children, .. } => Some(children[0]),
            };
            self.cache.deallocate(root_loc);
            self.nr_nodes -= 1;
        } else {
            self.write_node(root_loc, &root)?;
        }

        self.nr_keys -= 1;
        self.write_header()?;
        Ok(true)
    }

    // Removes `key` from the subtree rooted at `node`.  Children are
    // written back (and rebalanced) here; the caller owns the write back
    // of `node` itself.
    fn remove_from_(&mut self, node: &mut Node, key: &str) -> Result<bool> {
        let (idx, found) = self.key_index(node.keys(), key);

        if !found {
            if node.is_leaf() {
                return Ok(false);
            }

            let child_loc = node.children()[idx];
            let mut child = self.read_node(child_loc)?;
            if !self.remove_from_(&mut child, key)? {
                return Ok(false);
            }
            self.settle_child_(node, idx, child_loc, child)?;
            return Ok(true);
        }

        if node.is_leaf() {
            node.keys_mut().remove(idx);
            return Ok(true);
        }

        // An internal hit: swap in the in-order predecessor, then delete
        // the predecessor from the left subtree.
        let child_loc = node.children()[idx];
        let pred = self.predecessor_(child_loc)?;
        node.keys_mut()[idx] = pred.clone();

        let mut child = self.read_node(child_loc)?;
        let removed = self.remove_from_(&mut child, &pred)?;
        debug_assert!(removed, "predecessor missing from left subtree");
        self.settle_child_(node, idx, child_loc, child)?;
        Ok(true)
    }

    // Rightmost key of the subtree at `loc`.
    fn predecessor_(&mut self, mut loc: BlockNr) -> Result<String> {
        loop {
            match self.read_node(loc)? {
                Node::Leaf { mut keys } => {
                    ensure!(!keys.is_empty(), "empty leaf at block {}", loc);
                    return Ok(keys.pop().unwrap());
                }
                Node::Internal { children, .. } => {
                    loc = *children.last().unwrap();
                }
            }
        }
    }

    // Writes `child` back, rebalancing first if the removal left it below
    // the minimum occupancy.  `idx` is the child's position in `parent`.
    fn settle_child_(
        &mut self,
        parent: &mut Node,
        idx: usize,
        child_loc: BlockNr,
        child: Node,
    ) -> Result<()> {
        if child.nr_keys() >= self.min_keys() {
            return self.write_node(child_loc, &child);
        }
        self.rebalance_(parent, idx, child_loc, child)
    }

    // Steal a key from a sibling with spare capacity, or failing that
    // merge with one, preferring the left sibling both times.  `parent` is
    // mutated in memory; its own frame commits the change.
    fn rebalance_(
        &mut self,
        parent: &mut Node,
        idx: usize,
        child_loc: BlockNr,
        mut child: Node,
    ) -> Result<()> {
        let left_loc = idx.checked_sub(1).map(|i| parent.children()[i]);
        let right_loc = parent.children().get(idx + 1).copied();

        if let Some(l_loc) = left_loc {
            let mut left = self.read_node(l_loc)?;
            if left.nr_keys() > self.min_keys() {
                // Rotate the separator down into `child`; the donor's last
                // key replaces it in the parent.
                let sep = std::mem::replace(
                    &mut parent.keys_mut()[idx - 1],
                    left.keys_mut().pop().unwrap(),
                );
                child.keys_mut().insert(0, sep);

                if !child.is_leaf() {
                    let link = left.children_mut().pop().unwrap();
                    child.children_mut().insert(0, link);
                }

                self.write_node(l_loc, &left)?;
                return self.write_node(child_loc, &child);
            }
        }

        if let Some(r_loc) = right_loc {
            let mut right = self.read_node(r_loc)?;
            if right.nr_keys() > self.min_keys() {
                let sep =
                    std::mem::replace(&mut parent.keys_mut()[idx], right.keys_mut().remove(0));
                child.keys_mut().push(sep);

                if !child.is_leaf() {
                    let link = right.children_mut().remove(0);
                    child.children_mut().push(link);
                }

                self.write_node(r_loc, &right)?;
                return self.write_node(child_loc, &child);
            }
        }

        if let Some(l_loc) = left_loc {
            // Merge with the left sibling; the separator comes down between
            // the two runs of keys and the sibling's block is released.
            let left = self.read_node(l_loc)?;
            let sep = parent.keys_mut().remove(idx - 1);
            parent.children_mut().remove(idx - 1);

            match (left, &mut child) {
                (Node::Leaf { keys: mut lk }, Node::Leaf { keys: ck }) => {
                    lk.push(sep);
                    lk.append(ck);
                    *ck = lk;
                }
                (
                    Node::Internal {
                        keys: mut lk,
                        children: mut lc,
                    },
                    Node::Internal {
                        keys: ck,
                        children: cc,
                    },
                ) => {
                    lk.push(sep);
                    lk.append(ck);
                    *ck = lk;
                    lc.append(cc);
                    *cc = lc;
                }
                _ => bail!("sibling shape mismatch at block {}", l_loc),
            }

            self.cache.deallocate(l_loc);
            self.nr_nodes -= 1;
            return self.write_node(child_loc, &child);
        }

        let Some(r_loc) = right_loc else {
            bail!("underfull node at block {} has no siblings", child_loc);
        };

        let right = self.read_node(r_loc)?;
        let sep = parent.keys_mut().remove(idx);
        parent.children_mut().remove(idx + 1);

        match (&mut child, right) {
            (Node::Leaf { keys: ck }, Node::Leaf { keys: mut rk }) => {
                ck.push(sep);
                ck.append(&mut rk);
            }
            (
                Node::Internal {
                    keys: ck,
                    children: cc,
                },
                Node::Internal {
                    keys: mut rk,
                    children: mut rc,
                },
            ) => {
                ck.push(sep);
                ck.append(&mut rk);
                cc.append(&mut rc);
            }
            _ => bail!("sibling shape mismatch at block {}", r_loc),
        }

        self.cache.deallocate(r_loc);
        self.nr_nodes -= 1;
        self.write_node(child_loc, &child)
    }
}

//-------------------------------------------------------------------------
