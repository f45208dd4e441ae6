use anyhow::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

//-------------------------------------------------------------------------

pub type BlockNr = u32;

/// A fixed-length record file.  Blocks are the unit of io; the block size
/// and the path are immutable for the lifetime of the store.
pub struct BlockFile {
    file: File,
    block_size: usize,
}

impl BlockFile {
    /// Creates an empty block file, truncating anything already at `path`.
    pub fn create<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        Ok(Self { file, block_size })
    }

    /// Opens an existing block file.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        Ok(Self { file, block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// File length in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Reads one block into `buf`.  A read past end of file returns fewer
    /// than `block_size` bytes (possibly zero) and leaves the tail of the
    /// buffer untouched.  Callers must never rely on the contents of
    /// unwritten blocks.
    pub fn read(&mut self, block: BlockNr, buf: &mut [u8]) -> Result<usize> {
        debug_assert_eq!(buf.len(), self.block_size);

        self.file.seek(SeekFrom::Start(self.byte_offset(block)))?;

        let mut total = 0;
        while total < buf.len() {
            let n = self.file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }

        Ok(total)
    }

    /// Writes one block.  Writing past the current end of file extends it;
    /// any intervening bytes have undefined contents.
    pub fn write(&mut self, block: BlockNr, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.block_size);

        self.file.seek(SeekFrom::Start(self.byte_offset(block)))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn byte_offset(&self, block: BlockNr) -> u64 {
        block as u64 * self.block_size as u64
    }
}

//-------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    const BLOCK_SIZE: usize = 64;

    fn mk_file(dir: &TempDir) -> Result<BlockFile> {
        BlockFile::create(dir.path().join("store.flraf"), BLOCK_SIZE)
    }

    #[test]
    fn create_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let file = mk_file(&dir)?;
        assert_eq!(file.len()?, 0);
        Ok(())
    }

    #[test]
    fn write_then_read() -> Result<()> {
        let dir = TempDir::new()?;
        let mut file = mk_file(&dir)?;

        for b in 0..8u32 {
            let buf = vec![b as u8; BLOCK_SIZE];
            file.write(b, &buf)?;
        }

        for b in 0..8u32 {
            let mut buf = vec![0; BLOCK_SIZE];
            assert_eq!(file.read(b, &mut buf)?, BLOCK_SIZE);
            assert!(buf.iter().all(|byte| *byte == b as u8));
        }

        Ok(())
    }

    #[test]
    fn read_past_eof_is_short() -> Result<()> {
        let dir = TempDir::new()?;
        let mut file = mk_file(&dir)?;

        let mut buf = vec![0xff; BLOCK_SIZE];
        assert_eq!(file.read(12, &mut buf)?, 0);

        // the buffer must not be touched
        assert!(buf.iter().all(|byte| *byte == 0xff));
        Ok(())
    }

    #[test]
    fn write_past_eof_extends() -> Result<()> {
        let dir = TempDir::new()?;
        let mut file = mk_file(&dir)?;

        let buf = vec![21; BLOCK_SIZE];
        file.write(4, &buf)?;
        assert_eq!(file.len()?, 5 * BLOCK_SIZE as u64);

        let mut got = vec![0; BLOCK_SIZE];
        assert_eq!(file.read(4, &mut got)?, BLOCK_SIZE);
        assert_eq!(got, buf);
        Ok(())
    }

    #[test]
    fn reopen_sees_writes() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("store.flraf");

        {
            let mut file = BlockFile::create(&path, BLOCK_SIZE)?;
            file.write(0, &vec![42; BLOCK_SIZE])?;
            file.sync()?;
        }

        let mut file = BlockFile::open(&path, BLOCK_SIZE)?;
        let mut buf = vec![0; BLOCK_SIZE];
        assert_eq!(file.read(0, &mut buf)?, BLOCK_SIZE);
        assert!(buf.iter().all(|byte| *byte == 42));
        Ok(())
    }
}

//-------------------------------------------------------------------------
