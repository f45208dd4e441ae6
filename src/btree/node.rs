use anyhow::{bail, ensure, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::block_file::BlockNr;

//-------------------------------------------------------------------------

pub const LINK_SIZE: usize = 4;
pub const NULL_LINK: i32 = -1;

/// Raised when the configured geometry or a key cannot be laid out in a
/// node block.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("node size {node_size} and order {order} do not divide into whole key slots")]
    BadGeometry { order: usize, node_size: usize },

    #[error("key {0:?} does not fit in a {1} byte slot")]
    KeyTooLong(String, usize),

    #[error("key {0:?} would not survive an encode/decode round trip")]
    KeyNotEncodable(String),
}

//-------------------------------------------------------------------------

/// A tree node.  A leaf holds only keys; an internal node with k keys holds
/// exactly k + 1 child links.  The shape invariant is baked in here rather
/// than checked at every use site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Leaf {
        keys: Vec<String>,
    },
    Internal {
        keys: Vec<String>,
        children: Vec<BlockNr>,
    },
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn keys(&self) -> &[String] {
        match self {
            Node::Leaf { keys } => keys,
            Node::Internal { keys, .. } => keys,
        }
    }

    pub fn keys_mut(&mut self) -> &mut Vec<String> {
        match self {
            Node::Leaf { keys } => keys,
            Node::Internal { keys, .. } => keys,
        }
    }

    pub fn nr_keys(&self) -> usize {
        self.keys().len()
    }

    /// Child links; empty for a leaf.
    pub fn children(&self) -> &[BlockNr] {
        match self {
            Node::Leaf { .. } => &[],
            Node::Internal { children, .. } => children,
        }
    }

    pub fn children_mut(&mut self) -> &mut Vec<BlockNr> {
        match self {
            Node::Leaf { .. } => panic!("leaf nodes have no child links"),
            Node::Internal { children, .. } => children,
        }
    }
}

//-------------------------------------------------------------------------

/// Translates between a [`Node`] and the bytes of one block.
///
/// Layout of a block: `order - 1` key slots of `key_size` bytes each,
/// space padded on the right, followed by `order` link slots holding big
/// endian signed 32 bit integers.  An all-space key slot terminates the key
/// sequence; a [`NULL_LINK`] slot terminates the link sequence.
pub struct NodeCodec {
    order: usize,
    node_size: usize,
    key_size: usize,
    key_length: usize,
}

impl NodeCodec {
    pub fn new(order: usize, node_size: usize) -> Result<Self> {
        // One byte per character, the default charset.
        Self::with_bytes_per_char(order, node_size, 1)
    }

    /// `bytes_per_char` is the configured charset's average bytes per
    /// character.  Key slots are padded at byte granularity; the character
    /// length is a construction-time diagnostic, not a substitute for it.
    pub fn with_bytes_per_char(
        order: usize,
        node_size: usize,
        bytes_per_char: usize,
    ) -> Result<Self> {
        let bad_geometry = || CodecError::BadGeometry { order, node_size };

        ensure!(order >= 2 && bytes_per_char >= 1, bad_geometry());
        ensure!(node_size > order * LINK_SIZE, bad_geometry());

        let key_space = node_size - order * LINK_SIZE;
        if key_space % (order - 1) != 0 {
            bail!(bad_geometry());
        }

        let key_size = key_space / (order - 1);
        if key_size % bytes_per_char != 0 {
            bail!(bad_geometry());
        }

        Ok(Self {
            order,
            node_size,
            key_size,
            key_length: key_size / bytes_per_char,
        })
    }

    pub fn node_size(&self) -> usize {
        self.node_size
    }

    pub fn encode(&self, node: &Node) -> Result<Vec<u8>> {
        let keys = node.keys();
        let children = node.children();

        ensure!(
            keys.len() <= self.order - 1 && children.len() <= self.order,
            "node with {} keys and {} links overflows a block",
            keys.len(),
            children.len()
        );
        ensure!(
            children.is_empty() || children.len() == keys.len() + 1,
            "internal node with {} keys carries {} links",
            keys.len(),
            children.len()
        );

        let mut buf = Vec::with_capacity(self.node_size);

        for key in keys {
            // An empty key, or one with trailing spaces, decodes to
            // something other than what was written.
            if key.is_empty() || key.ends_with(' ') {
                bail!(CodecError::KeyNotEncodable(key.clone()));
            }

            let bytes = key.as_bytes();
            if bytes.len() > self.key_size || key.chars().count() > self.key_length {
                bail!(CodecError::KeyTooLong(key.clone(), self.key_size));
            }

            buf.extend_from_slice(bytes);
            buf.resize(buf.len() + self.key_size - bytes.len(), b' ');
        }

        // unused key slots stay all-space
        buf.resize(self.key_size * (self.order - 1), b' ');

        for link in children {
            buf.write_i32::<BigEndian>(*link as i32)?;
        }
        for _ in children.len()..self.order {
            buf.write_i32::<BigEndian>(NULL_LINK)?;
        }

        debug_assert_eq!(buf.len(), self.node_size);
        Ok(buf)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Node> {
        ensure!(
            bytes.len() == self.node_size,
            "expected a {} byte block, got {} bytes",
            self.node_size,
            bytes.len()
        );

        let mut keys = Vec::new();
        for slot in 0..self.order - 1 {
            let begin = slot * self.key_size;
            let raw = &bytes[begin..begin + self.key_size];
            let text = std::str::from_utf8(raw)?;

            let key = text.trim_end_matches(' ');
            if key.is_empty() {
                break;
            }
            keys.push(key.to_string());
        }

        let mut children = Vec::new();
        let mut r = &bytes[self.key_size * (self.order - 1)..];
        for _ in 0..self.order {
            let link = r.read_i32::<BigEndian>()?;
            if link == NULL_LINK {
                break;
            }
            ensure!(link >= 0, "corrupt link slot {}", link);
            children.push(link as BlockNr);
        }

        if children.is_empty() {
            Ok(Node::Leaf { keys })
        } else {
            ensure!(
                children.len() == keys.len() + 1,
                "internal node with {} keys carries {} links",
                keys.len(),
                children.len()
            );
            Ok(Node::Internal { keys, children })
        }
    }
}

//-------------------------------------------------------------------------


//-------------------------------------------------------------------------
