use anyhow::{ensure, Result};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::block_cache::BlockCache;
use crate::block_file::{BlockFile, BlockNr};

pub mod header;
pub mod node;

mod check;
mod insert;
mod lookup;
mod remove;

#[cfg(test)]
mod tests;

use header::{header_path, read_header, write_header, Header};
use node::{Node, NodeCodec};

//-------------------------------------------------------------------------

pub type Comparator = Box<dyn Fn(&str, &str) -> Ordering>;

/// Lexicographic on code points.
fn default_comparator() -> Comparator {
    Box::new(|a, b| a.cmp(b))
}

/// A disk backed set of textual keys.
///
/// The tree uniquely owns its cache, which uniquely owns the block file;
/// all node io goes through the cache.  Every successful [`BTree::add`] or
/// [`BTree::remove`] rewrites the header sidecar, so a store survives a
/// process restart once the cache has been flushed.
pub struct BTree {
    order: usize,
    codec: NodeCodec,
    cache: BlockCache,
    cmp: Comparator,
    file_path: PathBuf,

    root: Option<BlockNr>,
    nr_nodes: u64,
    nr_keys: u64,
}

impl BTree {
    /// Creates a fresh store.  `block_file_path` conventionally ends in
    /// `.flraf`; the header sidecar lands next to it with the extension
    /// swapped for `.hdr`.
    pub fn create<P: AsRef<Path>>(
        order: usize,
        node_size: usize,
        block_file_path: P,
        cache_capacity: usize,
    ) -> Result<Self> {
        Self::create_with_comparator(
            order,
            node_size,
            block_file_path,
            cache_capacity,
            default_comparator(),
        )
    }

    pub fn create_with_comparator<P: AsRef<Path>>(
        order: usize,
        node_size: usize,
        block_file_path: P,
        cache_capacity: usize,
        cmp: Comparator,
    ) -> Result<Self> {
        // An order 2 node cannot hold a split median.
        ensure!(order >= 3, "tree order must be at least 3, got {}", order);

        let codec = NodeCodec::new(order, node_size)?;
        let file = BlockFile::create(block_file_path.as_ref(), node_size)?;
        let cache = BlockCache::new(cache_capacity, file, Vec::new())?;

        let tree = Self {
            order,
            codec,
            cache,
            cmp,
            file_path: block_file_path.as_ref().to_path_buf(),
            root: None,
            nr_nodes: 0,
            nr_keys: 0,
        };

        debug!(path = %tree.file_path.display(), order, node_size, "created tree");
        tree.write_header()?;
        Ok(tree)
    }

    /// Reopens a store from its header sidecar, which carries the block
    /// file path inside it.
    pub fn open<P: AsRef<Path>>(header_path: P, cache_capacity: usize) -> Result<Self> {
        Self::open_with_comparator(header_path, cache_capacity, default_comparator())
    }

    pub fn open_with_comparator<P: AsRef<Path>>(
        path: P,
        cache_capacity: usize,
        cmp: Comparator,
    ) -> Result<Self> {
        let hdr = read_header(path.as_ref())?;
        let order = hdr.order as usize;
        let node_size = hdr.node_size as usize;

        let codec = NodeCodec::new(order, node_size)?;
        let file_path = PathBuf::from(&hdr.file_name);
        let file = BlockFile::open(&file_path, node_size)?;
        let cache = BlockCache::new(cache_capacity, file, hdr.free_list)?;

        debug!(path = %file_path.display(), nr_keys = hdr.nr_keys, "reopened tree");

        Ok(Self {
            order,
            codec,
            cache,
            cmp,
            file_path,
            root: hdr.root,
            nr_nodes: hdr.nr_nodes,
            nr_keys: hdr.nr_keys,
        })
    }

    //-------------------------------

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Nr of keys in the tree.
    pub fn len(&self) -> u64 {
        self.nr_keys
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.nr_nodes * self.codec.node_size() as u64
    }

    pub fn nr_nodes(&self) -> u64 {
        self.nr_nodes
    }

    /// The free stack, bottom first; the last entry is the next block to
    /// be reallocated.
    pub fn unallocated_blocks(&self) -> &[BlockNr] {
        self.cache.free_list()
    }

    /// Forces every buffered node write to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.cache.flush()
    }

    /// Flushes the cache, closes the block file, rewrites the header.
    pub fn close(self) -> Result<()> {
        debug!(path = %self.file_path.display(), nr_keys = self.nr_keys, "closing tree");
        let hdr = self.header_();
        self.cache.close()?;
        write_header(&header_path(&self.file_path), &hdr)
    }

    //-------------------------------

    fn header_(&self) -> Header {
        Header {
            file_name: self.file_path.to_string_lossy().into_owned(),
            order: self.order as u32,
            node_size: self.codec.node_size() as u32,
            nr_nodes: self.nr_nodes,
            nr_keys: self.nr_keys,
            root: self.root,
            free_list: self.cache.free_list().to_vec(),
        }
    }

    fn write_header(&self) -> Result<()> {
        write_header(&header_path(&self.file_path), &self.header_())
    }

    fn read_node(&mut self, loc: BlockNr) -> Result<Node> {
        let bytes = self.cache.read(loc)?;
        self.codec.decode(bytes)
    }

    fn write_node(&mut self, loc: BlockNr, node: &Node) -> Result<()> {
        let bytes = self.codec.encode(node)?;
        self.cache.write(loc, &bytes)
    }

    fn min_keys(&self) -> usize {
        // ceil(order / 2) - 1
        (self.order + 1) / 2 - 1
    }

    fn is_full(&self, node: &Node) -> bool {
        node.nr_keys() == self.order - 1
    }

    /// Index of the first key >= `key` under the tree's comparator, and
    /// whether it is an exact hit.  A linear scan: nodes are small and the
    /// comparator arbitrary.
    fn key_index(&self, keys: &[String], key: &str) -> (usize, bool) {
        for (i, k) in keys.iter().enumerate() {
            match (self.cmp)(key, k) {
                Ordering::Less => return (i, false),
                Ordering::Equal => return (i, true),
                Ordering::Greater => {}
            }
        }
        (keys.len(), false)
    }
}

//-------------------------------------------------------------------------
