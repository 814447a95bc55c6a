//! Level-1 column index: which block holds a given row id.

use std::collections::BTreeMap;
use std::collections::btree_map;

use strand_types::BlockLocation;

use super::header::{IndexHeader, PREFIX_SIZE, Prefix, SPLIT_VERSION, V1_HEADER_SIZE, V3_HEADER_SIZE};
use super::record::{self, RECORD_SIZE};
use crate::codec::FileOrder;
use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::vfs::{VirtualDirectory, VirtualFile};

/// Primary index file, holding the block records.
pub const IDX1: &str = "idx1";
/// Secondary index file carrying the v3+ header.
pub const IDX: &str = "idx";

/// In-memory interval tree over a column's block records.
///
/// Intervals are keyed by start id and never overlap, so the block
/// containing an id is the last one starting at or before it.
#[derive(Debug, Clone)]
pub struct ColumnIndexL1 {
    header: IndexHeader,
    order: FileOrder,
    blocks: BTreeMap<u64, BlockLocation>,
}

impl ColumnIndexL1 {
    /// Load the index of an opened column directory.
    #[tracing::instrument(level = "debug", skip(dir, config))]
    pub fn open(dir: &VirtualDirectory, config: &IndexConfig) -> Result<Self> {
        let idx1 = dir.open_file_read(IDX1)?;
        let mut head = [0u8; V1_HEADER_SIZE];
        let n = idx1.read_all_at(0, &mut head)?;
        let head = &head[..n];

        let prefix = Prefix::decode(head, IDX1)?;
        check_version(prefix.version, config)?;

        let (header, records_at) = if prefix.version < SPLIT_VERSION {
            (IndexHeader::decode(head, prefix, IDX1)?, prefix.header_size())
        } else {
            let header = Self::secondary_header(dir, prefix.version, config)?;
            (header, PREFIX_SIZE)
        };

        let mut index = Self {
            header,
            order: prefix.order,
            blocks: BTreeMap::new(),
        };
        index.load_records(&idx1, records_at as u64, config.batch_records)?;
        tracing::debug!(
            version = header.version,
            blocks = index.blocks.len(),
            swapped = index.byte_swapped(),
            "column index loaded"
        );
        Ok(index)
    }

    fn secondary_header(dir: &VirtualDirectory, version: u32, config: &IndexConfig) -> Result<IndexHeader> {
        let idx = dir.open_file_read(IDX)?;
        let mut head = [0u8; V3_HEADER_SIZE];
        let n = idx.read_all_at(0, &mut head)?;
        let head = &head[..n];

        let prefix = Prefix::decode(head, IDX)?;
        check_version(prefix.version, config)?;
        if prefix.version != version {
            return Err(Error::corrupt(format!(
                "{IDX1} is version {version} but {IDX} is version {}",
                prefix.version
            )));
        }
        IndexHeader::decode(head, prefix, IDX)
    }

    fn load_records(&mut self, file: &VirtualFile, start: u64, batch_records: usize) -> Result<()> {
        let total = self.header.num_blocks as usize;
        let batch = batch_records.max(1).min(total.max(1));
        let mut buf = vec![0u8; batch * RECORD_SIZE];
        let mut offset = start;
        let mut loaded = 0usize;

        while loaded < total {
            let want = batch.min(total - loaded);
            let n = file.read_all_at(offset, &mut buf[..want * RECORD_SIZE])?;
            if n % RECORD_SIZE != 0 {
                return Err(Error::corrupt(format!(
                    "{IDX1}: record {} truncated at offset {}",
                    loaded + n / RECORD_SIZE,
                    offset + (n - n % RECORD_SIZE) as u64
                )));
            }
            for chunk in buf[..n].chunks_exact(RECORD_SIZE) {
                self.insert(record::decode(chunk, self.order)?)?;
            }
            loaded += n / RECORD_SIZE;
            offset += n as u64;
            if n < want * RECORD_SIZE {
                tracing::warn!(loaded, expected = total, "column index ends early, keeping records read so far");
                break;
            }
        }
        Ok(())
    }

    /// Add a block, rejecting empty, wrapping and overlapping intervals.
    fn insert(&mut self, loc: BlockLocation) -> Result<()> {
        if loc.id_range == 0 {
            return Err(Error::corrupt(format!("block at {} covers no rows", loc.start_id)));
        }
        if loc.end_id().is_none() {
            return Err(Error::corrupt(format!("block at {} wraps the id space", loc.start_id)));
        }
        let before = self.blocks.range(..=loc.start_id).next_back();
        let after = self.blocks.range(loc.start_id..).next();
        for (_, other) in before.into_iter().chain(after) {
            if other.overlaps(&loc) {
                return Err(Error::corrupt(format!(
                    "block [{}, +{}) overlaps block [{}, +{})",
                    loc.start_id, loc.id_range, other.start_id, other.id_range
                )));
            }
        }
        self.blocks.insert(loc.start_id, loc);
        Ok(())
    }

    /// Covered ids as a half-open `(first, end)` pair; `None` when empty.
    ///
    /// Gaps between blocks are not reported.
    pub fn id_range(&self) -> Option<(u64, u64)> {
        let (_, first) = self.blocks.first_key_value()?;
        let (_, last) = self.blocks.last_key_value()?;
        Some((first.start_id, last.end_id()?))
    }

    /// Block holding ids `[first, upper)`.
    pub fn locate_block(&self, first: u64, upper: u64) -> Result<BlockLocation> {
        if first >= upper {
            return Err(Error::InvalidArgument(format!("empty row range [{first}, {upper})")));
        }
        let loc = self
            .blocks
            .range(..=first)
            .next_back()
            .map(|(_, loc)| *loc)
            .filter(|loc| loc.contains(first))
            .ok_or_else(|| Error::not_found(format!("no block contains row {first}")))?;
        let block_end = loc.end_id().unwrap_or(u64::MAX);
        if block_end < upper {
            return Err(Error::RangeInvalid {
                first,
                upper,
                block_end,
            });
        }
        Ok(loc)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in start-id order.
    pub fn iter(&self) -> btree_map::Values<'_, u64, BlockLocation> {
        self.blocks.values()
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// True when records are stored in the opposite byte order to the host.
    pub fn byte_swapped(&self) -> bool {
        self.order.is_swapped()
    }

    pub fn idx0_count(&self) -> u64 {
        self.header.idx0_count
    }
}

impl<'a> IntoIterator for &'a ColumnIndexL1 {
    type Item = &'a BlockLocation;
    type IntoIter = btree_map::Values<'a, u64, BlockLocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn check_version(version: u32, config: &IndexConfig) -> Result<()> {
    if version < config.min_version || version > config.max_version {
        return Err(Error::BadVersion {
            found: version,
            min: config.min_version,
            max: config.max_version,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::index::IndexWriter;
    use crate::vfs::MemoryDir;

    fn column(writer: &IndexWriter) -> VirtualDirectory {
        let dir = VirtualDirectory::new(Arc::new(MemoryDir::new())).unwrap();
        writer.write_to(&dir).unwrap();
        dir
    }

    fn sample(version: u32, order: FileOrder) -> IndexWriter {
        let mut w = IndexWriter::new(version).with_order(order);
        w.push(BlockLocation::new(1, 39, 0, 1))
            .push(BlockLocation::new(40, 60, 1, 1))
            .push(BlockLocation::new(200, 10, 2, 2));
        w
    }

    fn load(dir: &VirtualDirectory) -> Result<ColumnIndexL1> {
        ColumnIndexL1::open(dir, &IndexConfig::default())
    }

    #[test]
    fn test_locate_in_every_layout() {
        for version in [1, 2, 3] {
            for order in [FileOrder::Little, FileOrder::Big] {
                let index = load(&column(&sample(version, order))).unwrap();
                assert_eq!(index.len(), 3);
                assert_eq!(index.version(), version);
                assert_eq!(index.byte_swapped(), order != FileOrder::native());

                let loc = index.locate_block(45, 100).unwrap();
                assert_eq!(loc.pg, 1);
                assert_eq!(index.locate_block(1, 2).unwrap().pg, 0);
                assert_eq!(index.locate_block(209, 210).unwrap().generation, 2);
            }
        }
    }

    #[test]
    fn test_ids_outside_any_block() {
        let index = load(&column(&sample(1, FileOrder::Little))).unwrap();
        assert_eq!(index.locate_block(0, 1).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(index.locate_block(150, 151).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(index.locate_block(210, 211).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(index.id_range(), Some((1, 210)));
    }

    #[test]
    fn test_range_past_block_end() {
        let index = load(&column(&sample(2, FileOrder::Big))).unwrap();
        let err = index.locate_block(50, 200).unwrap_err();
        assert!(matches!(err, Error::RangeInvalid { block_end: 100, .. }));
        assert_eq!(index.locate_block(50, 50).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(index.locate_block(60, 50).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_touching_blocks_accepted() {
        let mut w = IndexWriter::new(1);
        w.push(BlockLocation::new(0, 10, 0, 0))
            .push(BlockLocation::new(10, 10, 1, 0));
        let index = load(&column(&w)).unwrap();
        assert_eq!(index.locate_block(10, 20).unwrap().pg, 1);
        assert_eq!(index.locate_block(9, 10).unwrap().pg, 0);
    }

    #[test]
    fn test_overlap_rejected() {
        let mut w = IndexWriter::new(3);
        w.push(BlockLocation::new(0, 10, 0, 0))
            .push(BlockLocation::new(5, 10, 1, 0));
        assert_eq!(load(&column(&w)).unwrap_err().kind(), ErrorKind::Corrupt);

        let mut w = IndexWriter::new(1);
        w.push(BlockLocation::new(7, 0, 0, 0));
        assert_eq!(load(&column(&w)).unwrap_err().kind(), ErrorKind::Corrupt);

        let mut w = IndexWriter::new(1);
        w.push(BlockLocation::new(u64::MAX - 2, 10, 0, 0));
        assert_eq!(load(&column(&w)).unwrap_err().kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_batches_smaller_than_index() {
        let mut w = IndexWriter::new(2);
        for i in 0..10u64 {
            w.push(BlockLocation::new(i * 100, 100, i, 0));
        }
        let dir = column(&w);
        let config = IndexConfig {
            batch_records: 3,
            ..IndexConfig::default()
        };
        let index = ColumnIndexL1::open(&dir, &config).unwrap();
        assert_eq!(index.len(), 10);
        assert_eq!(index.iter().map(|l| l.pg).collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
        assert_eq!(index.id_range(), Some((0, 1000)));
    }

    #[test]
    fn test_version_outside_configured_range() {
        let dir = column(&sample(3, FileOrder::Little));
        let config = IndexConfig {
            max_version: 2,
            ..IndexConfig::default()
        };
        let err = ColumnIndexL1::open(&dir, &config).unwrap_err();
        assert!(matches!(err, Error::BadVersion { found: 3, min: 1, max: 2 }));
    }

    #[test]
    fn test_v3_versions_must_agree() {
        let dir = column(&sample(3, FileOrder::Little));
        let mut idx = IndexWriter::new(3)
            .with_order(FileOrder::Little)
            .encode()
            .idx
            .unwrap();
        // Rewrite the secondary header as version 2
        idx[4] = 2;
        dir.create_file(IDX, 0o644).unwrap().write_all_at(0, &idx).unwrap();
        assert_eq!(load(&dir).unwrap_err().kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_v3_without_secondary_file() {
        let dir = column(&sample(3, FileOrder::Little));
        dir.remove(IDX).unwrap();
        assert_eq!(load(&dir).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_idx0_count_from_secondary() {
        let w = sample(3, FileOrder::Big).with_idx0_count(77);
        let index = load(&column(&w)).unwrap();
        assert_eq!(index.idx0_count(), 77);
        assert_eq!(index.header().num_blocks, 3);
    }
}
