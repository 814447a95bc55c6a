//! Archives presented as read-only directories.
//!
//! A file holding a KAR or tar archive can stand in for a whole database
//! object. [`open_archive`] tries each configured format in order and, on a
//! match, returns a [`VirtualDirectory`] rooted at the archive.

mod dir;
pub mod kar;
pub mod tar;
mod toc;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use dir::{ArchiveDir, ArchiveFile};
pub use kar::KarBuilder;
pub use toc::{Member, MemberKind, Toc};

use crate::vfs::{VfsError, VfsResult, VirtualDirectory, VirtualFile};

/// Supported archive encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Kar,
    Tar,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 2] = [ArchiveFormat::Kar, ArchiveFormat::Tar];

    fn probe(self, file: &VirtualFile, size: u64) -> VfsResult<Option<Toc>> {
        match self {
            ArchiveFormat::Kar => kar::probe(file, size),
            ArchiveFormat::Tar => tar::probe(file, size),
        }
    }
}

/// Open `file` as an archive directory.
///
/// Returns `Ok(None)` when no format recognizes the file, including files
/// that cannot be read at random offsets. A format whose signature matches
/// but whose structure is broken is logged and skipped.
#[tracing::instrument(level = "debug", skip(file), fields(backend = ?file.backend_kind()))]
pub fn open_archive(file: VirtualFile, formats: &[ArchiveFormat]) -> VfsResult<Option<VirtualDirectory>> {
    if formats.is_empty() || !file.random_access() || !file.can_read() {
        return Ok(None);
    }
    let size = match file.size() {
        Ok(size) => size,
        Err(VfsError::Unsupported(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    for &format in formats {
        match format.probe(&file, size) {
            Ok(Some(toc)) => {
                tracing::debug!(?format, members = toc.len(), "archive recognized");
                let dir = ArchiveDir::new(file, format, toc);
                return VirtualDirectory::new_read_only(Arc::new(dir)).map(Some);
            }
            Ok(None) => {}
            Err(VfsError::CorruptArchive(msg)) => {
                tracing::warn!(?format, error = %msg, "archive signature matched but contents are corrupt");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFile;

    fn as_file(bytes: Vec<u8>) -> VirtualFile {
        VirtualFile::new(Box::new(MemoryFile::from_bytes(bytes)), true, false).unwrap()
    }

    #[test]
    fn test_format_order_is_respected() {
        let mut builder = KarBuilder::new();
        builder.add_file("meta", b"m".to_vec());
        let bytes = builder.to_bytes();

        let dir = open_archive(as_file(bytes.clone()), &ArchiveFormat::ALL)
            .unwrap()
            .unwrap();
        assert_eq!(dir.list("").unwrap()[0].name, "meta");

        // Tar alone does not recognize a KAR file
        assert!(open_archive(as_file(bytes), &[ArchiveFormat::Tar]).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_format_falls_through() {
        let mut bytes = b"NCBI.sra".to_vec();
        bytes.extend_from_slice(&[0u8; 4]);
        assert!(open_archive(as_file(bytes), &ArchiveFormat::ALL).unwrap().is_none());
    }
}
