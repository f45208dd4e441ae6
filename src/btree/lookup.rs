use anyhow::Result;

use crate::btree::node::Node;
use crate::btree::BTree;

//-------------------------------------------------------------------------

impl BTree {
    /// Membership test.  Descends from the root without mutating anything.
    pub fn contains(&mut self, key: &str) -> Result<bool> {
        let Some(mut loc) = self.root else {
            return Ok(false);
        };

        loop {
            let node = self.read_node(loc)?;
            let (idx, found) = self.key_index(node.keys(), key);
            if found {
                return Ok(true);
            }

            match node {
                Node::Leaf { .. } => return Ok(false),
                Node::Internal { children, .. } => loc = children[idx],
            }
        }
    }
}

//-------------------------------------------------------------------------
