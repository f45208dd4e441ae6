use anyhow::Result;
use std::cmp::Ordering;

use crate::block_file::BlockNr;
use crate::btree::node::Node;
use crate::btree::BTree;

//-------------------------------------------------------------------------

impl BTree {
    /// Adds a key, returning false if it was already present.
    ///
    /// Full nodes are split on the way down, so a promoted median always
    /// has room in its parent and nothing propagates back up.
    pub fn add(&mut self, key: &str) -> Result<bool> {
        if !self.insert_(key)? {
            return Ok(false);
        }

        self.nr_keys += 1;
        self.write_header()?;
        Ok(true)
    }

    fn insert_(&mut self, key: &str) -> Result<bool> {
        let Some(root_loc) = self.root else {
            let loc = self.cache.allocate();
            self.write_node(
                loc,
                &Node::Leaf {
                    keys: vec![key.to_string()],
                },
            )?;
            self.root = Some(loc);
            self.nr_nodes += 1;
            return Ok(true);
        };

        let mut loc = root_loc;
        let mut node = self.read_node(loc)?;

        // A full root has no parent with room for the median, so give it
        // an empty one first.
        if self.is_full(&node) {
            let mut parent = Node::Internal {
                keys: Vec::new(),
                children: vec![loc],
            };
            self.split_child_(&mut parent, 0, loc, node)?;

            let parent_loc = self.cache.allocate();
            self.write_node(parent_loc, &parent)?;
            self.root = Some(parent_loc);
            self.nr_nodes += 1;

            loc = parent_loc;
            node = parent;
        }

        loop {
            // `node` is never full here
            let (idx, found) = self.key_index(node.keys(), key);
            if found {
                return Ok(false);
            }

            if node.is_leaf() {
                node.keys_mut().insert(idx, key.to_string());
                self.write_node(loc, &node)?;
                return Ok(true);
            }

            let child_loc = node.children()[idx];
            let child = self.read_node(child_loc)?;

            if self.is_full(&child) {
                self.split_child_(&mut node, idx, child_loc, child)?;
                self.write_node(loc, &node)?;

                // The median now sits at `idx`; pick a side.
                match (self.cmp)(key, &node.keys()[idx]) {
                    Ordering::Equal => return Ok(false),
                    Ordering::Less => loc = node.children()[idx],
                    Ordering::Greater => loc = node.children()[idx + 1],
                }
                node = self.read_node(loc)?;
            } else {
                loc = child_loc;
                node = child;
            }
        }
    }

    // Splits the full `child` at block `child_loc`, whose link sits at
    // position `idx` in `parent`.  The median key moves up into `parent`;
    // the left half keeps the old block and the right half gets a fresh
    // one.  `parent` is mutated in memory only.
    fn split_child_(
        &mut self,
        parent: &mut Node,
        idx: usize,
        child_loc: BlockNr,
        child: Node,
    ) -> Result<()> {
        let mid = (child.nr_keys() + 1) / 2 - 1;

        let (left, median, right) = match child {
            Node::Leaf { mut keys } => {
                let right_keys = keys.split_off(mid + 1);
                let median = keys.pop().unwrap();
                (
                    Node::Leaf { keys },
                    median,
                    Node::Leaf { keys: right_keys },
                )
            }
            Node::Internal {
                mut keys,
                mut children,
            } => {
                let right_keys = keys.split_off(mid + 1);
                let right_children = children.split_off(mid + 1);
                let median = keys.pop().unwrap();
                (
                    Node::Internal { keys, children },
                    median,
                    Node::Internal {
                        keys: right_keys,
                        children: right_children,
                    },
                )
            }
        };

        let right_loc = self.cache.allocate();
        self.write_node(child_loc, &left)?;
        self.write_node(right_loc, &right)?;

        parent.keys_mut().insert(idx, median);
        parent.children_mut()[idx] = child_loc;
        parent.children_mut().insert(idx + 1, right_loc);

        self.nr_nodes += 1;
        Ok(())
    }
}

//-------------------------------------------------------------------------
