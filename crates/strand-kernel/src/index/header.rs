//! Index file headers.
//!
//! ```text
//! prefix (all versions)        v1/v2 idx1 (40 bytes)      v3+ idx (48 bytes)
//! 0  endian   u32              8   data_eof   u64         8   data_eof    u64
//! 4  version  u32              16  idx2_eof   u64         16  idx2_eof    u64
//!                              24  num_blocks u32         24  idx0_count  u64
//!                              28  page_size  u32         32  num_blocks  u32
//!                              32  checksum   u8          36  page_size   u32
//!                              33  reserved   [u8; 7]     40  checksum    u8
//!                                                         41  reserved    [u8; 7]
//! ```
//!
//! From v3 on, `idx1` keeps only the prefix and its records start at byte 8;
//! the block counts move to the secondary `idx` file.

use crate::codec::{ENDIAN_TAG, FieldReader, FieldWriter, FileOrder};
use crate::error::{Error, Result};

/// Endian tag plus version.
pub const PREFIX_SIZE: usize = 8;
/// v1/v2 `idx1` header.
pub const V1_HEADER_SIZE: usize = 40;
/// v3+ `idx` header.
pub const V3_HEADER_SIZE: usize = 48;
/// First version with the split `idx1` / `idx` layout.
pub const SPLIT_VERSION: u32 = 3;

/// Checksum applied to data blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Checksum {
    #[default]
    None,
    Crc32,
    Md5,
}

impl Checksum {
    pub fn code(self) -> u8 {
        match self {
            Checksum::None => 0,
            Checksum::Crc32 => 1,
            Checksum::Md5 => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Checksum::None),
            1 => Some(Checksum::Crc32),
            2 => Some(Checksum::Md5),
            _ => None,
        }
    }
}

fn field_error(file: &str, field: &str, e: std::io::Error) -> Error {
    Error::corrupt(format!("{file}: {field}: {e}"))
}

/// The common prefix of every index file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prefix {
    pub order: FileOrder,
    pub version: u32,
}

impl Prefix {
    pub fn decode(buf: &[u8], file: &str) -> Result<Self> {
        if buf.len() < PREFIX_SIZE {
            return Err(Error::corrupt(format!(
                "{file}: {} bytes, too short for a header",
                buf.len()
            )));
        }
        let tag = [buf[0], buf[1], buf[2], buf[3]];
        let order = FileOrder::detect(tag).ok_or_else(|| {
            Error::corrupt(format!("{file}: bad endian tag {:#010x}", u32::from_le_bytes(tag)))
        })?;
        let version = FieldReader::new(&buf[4..PREFIX_SIZE], order)
            .u32()
            .map_err(|e| Error::corrupt(format!("{file}: version: {e}")))?;
        Ok(Self { order, version })
    }

    /// Header bytes required after this prefix in the named file.
    pub fn header_size(&self) -> usize {
        if self.version < SPLIT_VERSION {
            V1_HEADER_SIZE
        } else {
            PREFIX_SIZE
        }
    }
}

/// Decoded block-count header, whichever file it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    /// Byte order of the file the header was read from.
    pub order: FileOrder,
    pub data_eof: u64,
    pub idx2_eof: u64,
    /// Level-0 entry count; zero before v3.
    pub idx0_count: u64,
    pub num_blocks: u32,
    pub page_size: u32,
    pub checksum: Checksum,
}

impl IndexHeader {
    /// Decode the body following `prefix`.
    ///
    /// `buf` starts at the beginning of the file and must hold the whole
    /// header for the version.
    pub fn decode(buf: &[u8], prefix: Prefix, file: &str) -> Result<Self> {
        let size = if prefix.version < SPLIT_VERSION {
            V1_HEADER_SIZE
        } else {
            V3_HEADER_SIZE
        };
        if buf.len() < size {
            return Err(Error::corrupt(format!(
                "{file}: v{} header needs {size} bytes, have {}",
                prefix.version,
                buf.len()
            )));
        }

        let mut r = FieldReader::new(&buf[PREFIX_SIZE..size], prefix.order);
        let data_eof = r.u64().map_err(|e| field_error(file, "data_eof", e))?;
        let idx2_eof = r.u64().map_err(|e| field_error(file, "idx2_eof", e))?;
        let idx0_count = if prefix.version < SPLIT_VERSION {
            0
        } else {
            r.u64().map_err(|e| field_error(file, "idx0_count", e))?
        };
        let num_blocks = r.u32().map_err(|e| field_error(file, "num_blocks", e))?;
        let page_size = r.u32().map_err(|e| field_error(file, "page_size", e))?;
        let code = r.u8().map_err(|e| field_error(file, "checksum", e))?;
        let checksum = Checksum::from_code(code)
            .ok_or_else(|| Error::corrupt(format!("{file}: unknown checksum type {code}")))?;

        Ok(Self {
            version: prefix.version,
            order: prefix.order,
            data_eof,
            idx2_eof,
            idx0_count,
            num_blocks,
            page_size,
            checksum,
        })
    }

    /// Encode the full header: 40 bytes before v3, 48 bytes after.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FieldWriter::new(self.order);
        w.u32(ENDIAN_TAG).u32(self.version).u64(self.data_eof).u64(self.idx2_eof);
        if self.version >= SPLIT_VERSION {
            w.u64(self.idx0_count);
        }
        w.u32(self.num_blocks).u32(self.page_size).u8(self.checksum.code());
        w.zeros(7);
        w.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u32, order: FileOrder) -> IndexHeader {
        IndexHeader {
            version,
            order,
            data_eof: 4096,
            idx2_eof: 512,
            idx0_count: if version >= SPLIT_VERSION { 9 } else { 0 },
            num_blocks: 3,
            page_size: 1,
            checksum: Checksum::Crc32,
        }
    }

    #[test]
    fn test_sizes() {
        assert_eq!(header(1, FileOrder::Little).encode().len(), V1_HEADER_SIZE);
        assert_eq!(header(3, FileOrder::Big).encode().len(), V3_HEADER_SIZE);
    }

    #[test]
    fn test_decode_swapped() {
        let original = header(2, FileOrder::Big);
        let bytes = original.encode();
        let prefix = Prefix::decode(&bytes, "idx1").unwrap();
        assert_eq!(prefix.order, FileOrder::Big);
        assert_eq!(prefix.version, 2);
        assert_eq!(IndexHeader::decode(&bytes, prefix, "idx1").unwrap(), original);
    }

    #[test]
    fn test_bad_prefix() {
        assert!(matches!(Prefix::decode(&[0x88, 0x19], "idx1"), Err(Error::Corrupt(_))));
        assert!(matches!(Prefix::decode(&[0u8; 8], "idx1"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_unknown_checksum() {
        let mut bytes = header(1, FileOrder::Little).encode();
        bytes[32] = 7;
        let prefix = Prefix::decode(&bytes, "idx1").unwrap();
        assert!(matches!(IndexHeader::decode(&bytes, prefix, "idx1"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_short_body() {
        let bytes = header(3, FileOrder::Little).encode();
        let prefix = Prefix::decode(&bytes, "idx").unwrap();
        assert!(IndexHeader::decode(&bytes[..40], prefix, "idx").is_err());
    }
}
