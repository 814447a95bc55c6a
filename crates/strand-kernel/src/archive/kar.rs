//! KAR: a self-describing archive with a checksummed table of contents.
//!
//! ```text
//! 0   magic        b"NCBI.sra"
//! 8   endian       u32 = 0x05031988 in file order
//! 12  version      u32 = 1
//! 16  toc_len      u32
//! 20  toc_crc32    u32
//! 24  data_offset  u64
//! 32  toc          count: u32, then per entry:
//!                  name_len: u16, name, kind: u8, offset: u64, size: u64
//! ```
//!
//! Entry offsets are relative to `data_offset`.

use crc::{CRC_32_ISO_HDLC, Crc};
use strand_types::StructuralType;

use super::toc::{Member, MemberKind, Toc};
use crate::codec::{ENDIAN_TAG, FieldReader, FieldWriter, FileOrder};
use crate::vfs::{VfsError, VfsResult, VirtualDirectory, VirtualFile};

pub const MAGIC: &[u8; 8] = b"NCBI.sra";
pub const HEADER_SIZE: usize = 32;
pub const VERSION: u32 = 1;

const KIND_FILE: u8 = 0;
const KIND_DIR: u8 = 1;
const KIND_ZOMBIE: u8 = 2;

/// Table-driven CRC-32, built at compile time.
static TOC_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn corrupt(msg: impl Into<String>) -> VfsError {
    VfsError::corrupt_archive(format!("kar: {}", msg.into()))
}

/// Read the table of contents, or `None` if the file is not a KAR archive.
pub fn probe(file: &VirtualFile, container_size: u64) -> VfsResult<Option<Toc>> {
    let mut header = [0u8; HEADER_SIZE];
    let n = file.read_all_at(0, &mut header)?;
    if n < MAGIC.len() || &header[..MAGIC.len()] != MAGIC {
        return Ok(None);
    }
    if n < HEADER_SIZE {
        return Err(corrupt(format!("header truncated at {n} bytes")));
    }

    let tag: [u8; 4] = [header[8], header[9], header[10], header[11]];
    let order = FileOrder::detect(tag).ok_or_else(|| corrupt("bad endian tag"))?;
    let mut r = FieldReader::new(&header[12..], order);
    let short = |_| corrupt("header truncated");
    let version = r.u32().map_err(short)?;
    let toc_len = r.u32().map_err(short)?;
    let toc_crc = r.u32().map_err(short)?;
    let data_offset = r.u64().map_err(short)?;

    if version != VERSION {
        return Err(corrupt(format!("unsupported version {version}")));
    }
    let toc_end = HEADER_SIZE as u64 + u64::from(toc_len);
    if toc_end > container_size {
        return Err(corrupt("table of contents runs past end of archive"));
    }
    if data_offset > container_size {
        return Err(corrupt("data offset past end of archive"));
    }
    if data_offset < toc_end {
        return Err(corrupt("data overlaps table of contents"));
    }

    let mut toc_bytes = vec![0u8; toc_len as usize];
    if file.read_all_at(HEADER_SIZE as u64, &mut toc_bytes)? < toc_bytes.len() {
        return Err(corrupt("table of contents truncated"));
    }
    let crc = TOC_CRC.checksum(&toc_bytes);
    if crc != toc_crc {
        return Err(corrupt(format!("toc checksum {crc:#010x}, header says {toc_crc:#010x}")));
    }

    parse_toc(&toc_bytes, order, data_offset, container_size).map(Some)
}

fn parse_toc(bytes: &[u8], order: FileOrder, data_offset: u64, container_size: u64) -> VfsResult<Toc> {
    let short = |_| corrupt("table of contents truncated");
    let mut r = FieldReader::new(bytes, order);
    let count = r.u32().map_err(short)?;
    let mut toc = Toc::new();

    for _ in 0..count {
        let name_len = r.u16().map_err(short)?;
        let name = r.bytes(usize::from(name_len)).map_err(short)?;
        let name = std::str::from_utf8(name).map_err(|_| corrupt("member name is not utf-8"))?;
        let kind = r.u8().map_err(short)?;
        let offset = r.u64().map_err(short)?;
        let size = r.u64().map_err(short)?;

        let member = match kind {
            KIND_DIR => Member::directory(),
            KIND_FILE | KIND_ZOMBIE => {
                let start = data_offset
                    .checked_add(offset)
                    .ok_or_else(|| corrupt(format!("{name}: offset overflows")))?;
                let end = start
                    .checked_add(size)
                    .ok_or_else(|| corrupt(format!("{name}: size overflows")))?;
                let kind = if kind == KIND_ZOMBIE || end > container_size {
                    MemberKind::Zombie
                } else {
                    MemberKind::File
                };
                Member {
                    kind,
                    offset: start,
                    size,
                }
            }
            other => return Err(corrupt(format!("{name}: unknown entry kind {other}"))),
        };
        toc.insert(name, member)?;
    }

    if r.remaining() != 0 {
        return Err(corrupt(format!("{} trailing bytes after toc", r.remaining())));
    }
    Ok(toc)
}

enum Pending {
    File(Vec<u8>),
    Directory,
    Zombie,
}

/// Builds a KAR archive in memory.
pub struct KarBuilder {
    order: FileOrder,
    entries: Vec<(String, Pending)>,
}

impl Default for KarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KarBuilder {
    pub fn new() -> Self {
        Self {
            order: FileOrder::native(),
            entries: Vec::new(),
        }
    }

    /// Byte order to write in; defaults to the host's.
    pub fn with_order(mut self, order: FileOrder) -> Self {
        self.order = order;
        self
    }

    pub fn add_file(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.push((name.into(), Pending::File(data.into())));
        self
    }

    pub fn add_dir(&mut self, name: impl Into<String>) -> &mut Self {
        self.entries.push((name.into(), Pending::Directory));
        self
    }

    pub fn add_zombie(&mut self, name: impl Into<String>) -> &mut Self {
        self.entries.push((name.into(), Pending::Zombie));
        self
    }

    /// Collect every entry below `path` in `dir`.
    pub fn add_tree(&mut self, dir: &VirtualDirectory, path: &str) -> VfsResult<&mut Self> {
        dir.visit(path, true, &mut |rel, entry| {
            let full = if path.is_empty() || path == "." {
                rel.to_string()
            } else {
                format!("{path}/{rel}")
            };
            match entry.kind.ty {
                StructuralType::Directory if !entry.kind.alias => {
                    self.add_dir(rel);
                }
                StructuralType::File => {
                    let data = dir.open_file_read(&full)?.read_to_end()?;
                    self.add_file(rel, data);
                }
                StructuralType::ZombieFile => {
                    self.add_zombie(rel);
                }
                other => tracing::debug!(path = %full, kind = %other, "skipping entry"),
            }
            Ok(())
        })?;
        Ok(self)
    }

    /// Archive a whole directory.
    pub fn from_directory(dir: &VirtualDirectory) -> VfsResult<Self> {
        let mut builder = Self::new();
        builder.add_tree(dir, "")?;
        Ok(builder)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut toc = FieldWriter::new(self.order);
        toc.u32(self.entries.len() as u32);
        let mut data_len = 0u64;
        for (name, pending) in &self.entries {
            let (kind, size) = match pending {
                Pending::File(data) => (KIND_FILE, data.len() as u64),
                Pending::Directory => (KIND_DIR, 0),
                Pending::Zombie => (KIND_ZOMBIE, 0),
            };
            toc.u16(name.len() as u16)
                .bytes(name.as_bytes())
                .u8(kind)
                .u64(data_len)
                .u64(size);
            data_len += size;
        }
        let toc = toc.into_inner();

        let mut out = FieldWriter::new(self.order);
        out.bytes(MAGIC)
            .u32(ENDIAN_TAG)
            .u32(VERSION)
            .u32(toc.len() as u32)
            .u32(TOC_CRC.checksum(&toc))
            .u64((HEADER_SIZE + toc.len()) as u64)
            .bytes(&toc);
        for (_, pending) in &self.entries {
            if let Pending::File(data) = pending {
                out.bytes(data);
            }
        }
        out.into_inner()
    }

    /// Write the archive at the start of `file`. Returns bytes written.
    pub fn write_to(&self, file: &VirtualFile) -> VfsResult<u64> {
        let bytes = self.to_bytes();
        let n = file.write_all_at(0, &bytes)?;
        Ok(n as u64)
    }
}
