//! Encoder for level-1 index files, for tooling and fixtures.

use strand_types::BlockLocation;

use super::header::{Checksum, IndexHeader, PREFIX_SIZE, SPLIT_VERSION};
use super::l1::{IDX, IDX1};
use super::record;
use crate::codec::{FieldWriter, FileOrder};
use crate::error::Result;
use crate::vfs::VirtualDirectory;

/// Encoded index files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFiles {
    pub idx1: Vec<u8>,
    /// Secondary header file, v3 onward.
    pub idx: Option<Vec<u8>>,
}

/// Builds `idx1` (and `idx` from v3) for a set of blocks.
#[derive(Debug, Clone)]
pub struct IndexWriter {
    version: u32,
    order: FileOrder,
    data_eof: u64,
    idx2_eof: u64,
    idx0_count: u64,
    page_size: u32,
    checksum: Checksum,
    blocks: Vec<BlockLocation>,
}

impl IndexWriter {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            order: FileOrder::native(),
            data_eof: 0,
            idx2_eof: 0,
            idx0_count: 0,
            page_size: 1,
            checksum: Checksum::None,
            blocks: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: FileOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_idx0_count(mut self, count: u64) -> Self {
        self.idx0_count = count;
        self
    }

    pub fn with_eofs(mut self, data_eof: u64, idx2_eof: u64) -> Self {
        self.data_eof = data_eof;
        self.idx2_eof = idx2_eof;
        self
    }

    /// Append a block. Blocks are written in insertion order.
    pub fn push(&mut self, loc: BlockLocation) -> &mut Self {
        self.blocks.push(loc);
        self
    }

    fn header(&self) -> IndexHeader {
        IndexHeader {
            version: self.version,
            order: self.order,
            data_eof: self.data_eof,
            idx2_eof: self.idx2_eof,
            idx0_count: if self.version >= SPLIT_VERSION { self.idx0_count } else { 0 },
            num_blocks: self.blocks.len() as u32,
            page_size: self.page_size,
            checksum: self.checksum,
        }
    }

    pub fn encode(&self) -> IndexFiles {
        let header = self.header();
        let mut idx1 = FieldWriter::new(self.order);
        let idx = if self.version < SPLIT_VERSION {
            idx1.bytes(&header.encode());
            None
        } else {
            idx1.bytes(&header.encode()[..PREFIX_SIZE]);
            Some(header.encode())
        };
        for loc in &self.blocks {
            record::encode(&mut idx1, loc);
        }
        IndexFiles {
            idx1: idx1.into_inner(),
            idx,
        }
    }

    /// Write the files into a column directory, replacing existing ones.
    pub fn write_to(&self, dir: &VirtualDirectory) -> Result<()> {
        let files = self.encode();
        dir.create_file(IDX1, 0o644)?.write_all_at(0, &files.idx1)?;
        if let Some(idx) = files.idx {
            dir.create_file(IDX, 0o644)?.write_all_at(0, &idx)?;
        }
        Ok(())
    }
}
