use anyhow::{ensure, Result};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::block_file::BlockNr;
use crate::btree::node::Node;
use crate::btree::BTree;

//-------------------------------------------------------------------------

impl BTree {
    fn check_(
        &mut self,
        loc: BlockNr,
        key_min: Option<&str>,
        key_max: Option<&str>,
        is_root: bool,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        seen: &mut BTreeSet<BlockNr>,
    ) -> Result<u64> {
        ensure!(seen.insert(loc), "block {} is reachable twice", loc);
        ensure!(
            !self.cache.free_list().contains(&loc),
            "block {} is both reachable and free",
            loc
        );

        let node = self.read_node(loc)?;
        let nr_keys = node.nr_keys();

        if is_root {
            ensure!(nr_keys > 0, "the root of a non-empty tree has no keys");
        } else {
            ensure!(
                nr_keys >= self.min_keys(),
                "block {} holds {} keys, minimum is {}",
                loc,
                nr_keys,
                self.min_keys()
            );
        }
        ensure!(
            nr_keys <= self.order - 1,
            "block {} holds {} keys, maximum is {}",
            loc,
            nr_keys,
            self.order - 1
        );

        for (i, k) in node.keys().iter().enumerate() {
            if let Some(min) = key_min {
                ensure!(
                    (self.cmp)(k, min) == Ordering::Greater,
                    "key {:?} escapes its subtree on the low side",
                    k
                );
            }
            if let Some(max) = key_max {
                ensure!(
                    (self.cmp)(k, max) == Ordering::Less,
                    "key {:?} escapes its subtree on the high side",
                    k
                );
            }
            if i > 0 {
                ensure!(
                    (self.cmp)(&node.keys()[i - 1], k) == Ordering::Less,
                    "keys out of order: {:?}, {:?}",
                    node.keys()[i - 1],
                    k
                );
            }
        }

        match &node {
            Node::Leaf { .. } => {
                match leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(d) => ensure!(*d == depth, "leaves at depths {} and {}", d, depth),
                }
                Ok(nr_keys as u64)
            }
            Node::Internal { keys, children } => {
                ensure!(
                    children.len() == keys.len() + 1,
                    "internal block {} has {} keys but {} links",
                    loc,
                    keys.len(),
                    children.len()
                );

                let mut total = nr_keys as u64;
                for i in 0..children.len() {
                    let lo = if i == 0 {
                        key_min
                    } else {
                        Some(keys[i - 1].as_str())
                    };
                    let hi = if i == keys.len() {
                        key_max
                    } else {
                        Some(keys[i].as_str())
                    };
                    total += self.check_(children[i], lo, hi, false, depth + 1, leaf_depth, seen)?;
                }
                Ok(total)
            }
        }
    }

    /// Checks the tree is well formed and returns the number of keys.
    pub fn check(&mut self) -> Result<u64> {
        let Some(root) = self.root else {
            ensure!(self.nr_nodes == 0, "empty tree claims {} nodes", self.nr_nodes);
            ensure!(self.nr_keys == 0, "empty tree claims {} keys", self.nr_keys);
            return Ok(0);
        };

        let mut seen = BTreeSet::new();
        let mut leaf_depth = None;
        let total = self.check_(root, None, None, true, 0, &mut leaf_depth, &mut seen)?;

        ensure!(
            seen.len() as u64 == self.nr_nodes,
            "{} reachable nodes but the tree claims {}",
            seen.len(),
            self.nr_nodes
        );
        ensure!(
            total == self.nr_keys,
            "{} reachable keys but the tree claims {}",
            total,
            self.nr_keys
        );

        Ok(total)
    }
}

//-------------------------------------------------------------------------
