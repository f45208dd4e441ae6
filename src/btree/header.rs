use anyhow::{ensure, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use crate::block_file::BlockNr;
use crate::btree::node::NULL_LINK;

//-------------------------------------------------------------------------

const MAGIC: u32 = 0x6b74_6872; // "kthr"
const VERSION: u32 = 1;

/// The sidecar record that makes a tree reopenable: geometry, the root,
/// the node and key counts, and the free stack (bottom first).  It carries
/// the block file path, so reopening needs nothing else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub file_name: String,
    pub order: u32,
    pub node_size: u32,
    pub nr_nodes: u64,
    pub nr_keys: u64,
    pub root: Option<BlockNr>,
    pub free_list: Vec<BlockNr>,
}

impl Header {
    pub fn tree_size(&self) -> u64 {
        self.nr_nodes * self.node_size as u64
    }

    pub fn pack<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<BigEndian>(MAGIC)?;
        w.write_u32::<BigEndian>(VERSION)?;
        w.write_u32::<BigEndian>(self.order)?;
        w.write_u32::<BigEndian>(self.node_size)?;
        w.write_u64::<BigEndian>(self.nr_nodes)?;
        w.write_u64::<BigEndian>(self.tree_size())?;
        w.write_u64::<BigEndian>(self.nr_keys)?;

        match self.root {
            None => w.write_i32::<BigEndian>(NULL_LINK)?,
            Some(loc) => w.write_i32::<BigEndian>(loc as i32)?,
        }

        w.write_u32::<BigEndian>(self.free_list.len() as u32)?;
        for loc in &self.free_list {
            w.write_u32::<BigEndian>(*loc)?;
        }

        let name = self.file_name.as_bytes();
        w.write_u16::<BigEndian>(name.len() as u16)?;
        w.write_all(name)?;
        Ok(())
    }

    pub fn unpack<R: Read>(r: &mut R) -> Result<Self> {
        let magic = r.read_u32::<BigEndian>()?;
        ensure!(magic == MAGIC, "bad header magic {:#x}", magic);
        let version = r.read_u32::<BigEndian>()?;
        ensure!(version == VERSION, "unsupported header version {}", version);

        let order = r.read_u32::<BigEndian>()?;
        let node_size = r.read_u32::<BigEndian>()?;
        let nr_nodes = r.read_u64::<BigEndian>()?;
        let tree_size = r.read_u64::<BigEndian>()?;
        let nr_keys = r.read_u64::<BigEndian>()?;
        ensure!(
            tree_size == nr_nodes * node_size as u64,
            "tree size {} does not match {} nodes of {} bytes",
            tree_size,
            nr_nodes,
            node_size
        );

        let root = match r.read_i32::<BigEndian>()? {
            NULL_LINK => None,
            loc => {
                ensure!(loc >= 0, "corrupt root block {}", loc);
                Some(loc as BlockNr)
            }
        };

        let nr_free = r.read_u32::<BigEndian>()? as usize;
        let mut free_list = Vec::with_capacity(nr_free);
        for _ in 0..nr_free {
            free_list.push(r.read_u32::<BigEndian>()?);
        }

        let name_len = r.read_u16::<BigEndian>()? as usize;
        let mut name = vec![0; name_len];
        r.read_exact(&mut name)?;

        Ok(Self {
            file_name: String::from_utf8(name)?,
            order,
            node_size,
            nr_nodes,
            nr_keys,
            root,
            free_list,
        })
    }
}

//-------------------------------------------------------------------------

/// `store.flraf` keeps its header at `store.hdr`.
pub fn header_path(block_file: &Path) -> PathBuf {
    block_file.with_extension("hdr")
}

/// Serializes `hdr` with a trailing crc32c and renames it into place, so a
/// crash mid-write cannot leave a torn header behind.
pub fn write_header(path: &Path, hdr: &Header) -> Result<()> {
    let mut payload = Vec::new();
    hdr.pack(&mut payload)?;
    let sum = crc32c::crc32c(&payload);
    payload.write_u32::<BigEndian>(sum)?;

    let tmp = path.with_extension("hdr.tmp");
    fs::write(&tmp, &payload)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_header(path: &Path) -> Result<Header> {
    let bytes = fs::read(path)?;
    ensure!(bytes.len() > 4, "header file is truncated");

    let (payload, sum) = bytes.split_at(bytes.len() - 4);
    let expected = u32::from_be_bytes(sum.try_into().unwrap());
    ensure!(
        crc32c::crc32c(payload) == expected,
        "header checksum mismatch"
    );

    Header::unpack(&mut Cursor::new(payload))
}

//-------------------------------------------------------------------------


//-------------------------------------------------------------------------
