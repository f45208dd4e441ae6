use anyhow::{ensure, Result};
use tracing::debug;

use crate::block_file::{BlockFile, BlockNr};

//-------------------------------------------------------------------------

struct CacheEntry {
    loc: BlockNr,
    data: Vec<u8>,
    dirty: bool,
}

/// A write-back cache over a [`BlockFile`], which it exclusively owns.
///
/// Entries are kept in admission order: index 0 is the most recently
/// admitted, the tail is the eviction candidate.  The cache also acts as
/// the block allocator; freed block numbers go onto a LIFO stack and are
/// handed out again before the high water mark is bumped.
pub struct BlockCache {
    file: BlockFile,
    capacity: usize,
    entries: Vec<CacheEntry>,
    free_list: Vec<BlockNr>,

    // One past the highest block ever allocated.
    nr_blocks: u64,
}

impl BlockCache {
    /// `free_list` is the persisted stack, bottom first, so the order of
    /// reallocation survives a reopen.
    pub fn new(capacity: usize, file: BlockFile, free_list: Vec<BlockNr>) -> Result<Self> {
        ensure!(capacity > 0, "cache capacity must be at least 1");

        let nr_blocks = file.len()? / file.block_size() as u64;
        Ok(Self {
            file,
            capacity,
            entries: Vec::with_capacity(capacity),
            free_list,
            nr_blocks,
        })
    }

    /// Nr of entries currently held.
    pub fn residency(&self) -> usize {
        self.entries.len()
    }

    pub fn is_resident(&self, loc: BlockNr) -> bool {
        self.position_(loc).is_some()
    }

    /// The free stack, bottom first.
    pub fn free_list(&self) -> &[BlockNr] {
        &self.free_list
    }

    fn position_(&self, loc: BlockNr) -> Option<usize> {
        // Linear scan; these caches hold a handful of entries.
        self.entries.iter().position(|e| e.loc == loc)
    }

    /// Returns the bytes of `loc`, promoting from the block file on a miss.
    pub fn read(&mut self, loc: BlockNr) -> Result<&[u8]> {
        if let Some(i) = self.position_(loc) {
            return Ok(&self.entries[i].data);
        }

        let mut data = vec![0; self.file.block_size()];
        self.file.read(loc, &mut data)?;
        self.admit_(CacheEntry {
            loc,
            data,
            dirty: false,
        })?;

        Ok(&self.entries[0].data)
    }

    /// Replaces the bytes of `loc` and marks the entry dirty.  The write
    /// reaches the file on flush, close or capacity pressure.
    pub fn write(&mut self, loc: BlockNr, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.file.block_size());

        if let Some(i) = self.position_(loc) {
            let entry = &mut self.entries[i];
            entry.data.copy_from_slice(data);
            entry.dirty = true;
            return Ok(());
        }

        self.admit_(CacheEntry {
            loc,
            data: data.to_vec(),
            dirty: true,
        })
    }

    // Installs a new entry at position 0.  On a full cache the last clean
    // entry (scanning from the tail) is evicted; if everything is dirty the
    // whole cache is flushed first and the tail dropped.
    fn admit_(&mut self, entry: CacheEntry) -> Result<()> {
        if self.entries.len() >= self.capacity {
            if let Some(t) = self.entries.iter().rposition(|e| !e.dirty) {
                self.entries.remove(t);
            } else {
                self.flush()?;
                self.entries.pop();
            }
        }

        self.entries.insert(0, entry);
        Ok(())
    }

    /// Hands out a block number.  The caller is expected to `write` the new
    /// block promptly; allocation itself does not touch the cache.
    pub fn allocate(&mut self) -> BlockNr {
        if let Some(loc) = self.free_list.pop() {
            loc
        } else {
            let loc = self.nr_blocks as BlockNr;
            self.nr_blocks += 1;
            loc
        }
    }

    /// Returns `loc` to the free stack.  A resident entry has its dirty bit
    /// cleared; the contents of a free block never need to be persisted.
    pub fn deallocate(&mut self, loc: BlockNr) {
        self.free_list.push(loc);
        if let Some(i) = self.position_(loc) {
            self.entries[i].dirty = false;
        }
    }

    /// Writes back every dirty entry.
    pub fn flush(&mut self) -> Result<()> {
        let mut nr_written = 0;
        for entry in &mut self.entries {
            if entry.dirty {
                self.file.write(entry.loc, &entry.data)?;
                entry.dirty = false;
                nr_written += 1;
            }
        }

        if nr_written > 0 {
            debug!(nr_written, "flushed cache");
        }
        Ok(())
    }

    /// Flush, then sync and close the block file.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.file.sync()
    }
}

//-------------------------------------------------------------------------


//-------------------------------------------------------------------------
