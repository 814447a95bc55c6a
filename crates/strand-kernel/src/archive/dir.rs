//! Read-only directory view over an archive carried in a [`VirtualFile`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use strand_types::{PathType, StructuralType};

use super::ArchiveFormat;
use super::toc::{MemberKind, Toc};
use crate::vfs::{
    BackendKind, DirCaps, DirEntry, DirOps, DispatchVersion, FileCaps, FileOps, VfsError,
    VfsResult, VirtualFile, path,
};

/// State shared by every view into one archive.
struct Container {
    file: VirtualFile,
    format: ArchiveFormat,
    toc: Toc,
    open_members: AtomicUsize,
}

/// Directory inside an archive.
///
/// Opened member files are accounted here and released through
/// [`DirOps::release_file`].
#[derive(Clone)]
pub struct ArchiveDir {
    container: Arc<Container>,
    base: String,
}

impl std::fmt::Debug for ArchiveDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDir")
            .field("format", &self.container.format)
            .field("base", &self.base)
            .field("members", &self.container.toc.len())
            .finish()
    }
}

impl ArchiveDir {
    pub(crate) fn new(file: VirtualFile, format: ArchiveFormat, toc: Toc) -> Self {
        Self {
            container: Arc::new(Container {
                file,
                format,
                toc,
                open_members: AtomicUsize::new(0),
            }),
            base: String::new(),
        }
    }

    pub fn format(&self) -> ArchiveFormat {
        self.container.format
    }

    /// Member files currently open through any view of this archive.
    pub fn open_members(&self) -> usize {
        self.container.open_members.load(Ordering::Acquire)
    }

    pub fn has_zombies(&self) -> bool {
        self.container.toc.has_zombies()
    }

    fn full(&self, rel: &str) -> VfsResult<String> {
        path::join(&self.base, rel)
    }
}

impl DirOps for ArchiveDir {
    fn version(&self) -> DispatchVersion {
        DispatchVersion::CURRENT
    }

    fn capabilities(&self) -> DirCaps {
        DirCaps::LIST
            | DirCaps::PATH_TYPE
            | DirCaps::RESOLVE
            | DirCaps::OPEN_FILE
            | DirCaps::OPEN_DIR
            | DirCaps::ACCESS
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::ArchiveMember
    }

    fn read_only(&self) -> bool {
        true
    }

    fn list(&self, rel: &str) -> VfsResult<Vec<DirEntry>> {
        let full = self.full(rel)?;
        match self.container.toc.get(&full) {
            Some(m) if m.kind == MemberKind::Directory => {}
            Some(_) => return Err(VfsError::not_a_directory(full)),
            None => return Err(VfsError::not_found(full)),
        }
        Ok(self
            .container
            .toc
            .children(&full)
            .map(|(name, m)| DirEntry::new(name, m.kind.structural_type()))
            .collect())
    }

    fn path_type(&self, rel: &str) -> PathType {
        let Ok(full) = self.full(rel) else {
            return PathType::new(StructuralType::BadPath);
        };
        if let Some(m) = self.container.toc.get(&full) {
            return PathType::new(m.kind.structural_type());
        }
        // Walking through a file member is a bad path, not a missing one
        let mut parent = path::parent(&full);
        while let Some(p) = parent {
            if let Some(m) = self.container.toc.get(p) {
                if m.kind != MemberKind::Directory {
                    return PathType::new(StructuralType::BadPath);
                }
                break;
            }
            parent = path::parent(p);
        }
        PathType::new(StructuralType::NotFound)
    }

    fn resolve_path(&self, rel: &str) -> VfsResult<String> {
        Ok(format!("/{}", self.full(rel)?))
    }

    fn open_file_read(&self, rel: &str) -> VfsResult<Box<dyn FileOps>> {
        let full = self.full(rel)?;
        let member = match self.container.toc.get(&full) {
            Some(m) if m.kind == MemberKind::File => *m,
            Some(m) if m.kind == MemberKind::Directory => {
                return Err(VfsError::is_a_directory(full));
            }
            _ => return Err(VfsError::not_found(full)),
        };
        self.container.open_members.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(ArchiveFile {
            container: Arc::clone(&self.container),
            offset: member.offset,
            size: member.size,
        }))
    }

    fn open_dir_read(&self, rel: &str) -> VfsResult<Arc<dyn DirOps>> {
        let full = self.full(rel)?;
        match self.container.toc.get(&full) {
            Some(m) if m.kind == MemberKind::Directory => Ok(Arc::new(ArchiveDir {
                container: Arc::clone(&self.container),
                base: full,
            })),
            Some(_) => Err(VfsError::not_a_directory(full)),
            None => Err(VfsError::not_found(full)),
        }
    }

    fn access(&self, rel: &str) -> VfsResult<u32> {
        let full = self.full(rel)?;
        match self.container.toc.get(&full) {
            Some(m) if m.kind == MemberKind::Directory => Ok(0o555),
            Some(m) if m.kind == MemberKind::File => Ok(0o444),
            _ => Err(VfsError::not_found(full)),
        }
    }

    fn owns_files(&self) -> bool {
        true
    }

    fn release_file(&self, rel: &str, file: &dyn FileOps) -> VfsResult<()> {
        let left = self.container.open_members.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(member = rel, open = left.saturating_sub(1), "archive member released");
        file.close()
    }
}

/// Bounded window onto the container file.
pub struct ArchiveFile {
    container: Arc<Container>,
    offset: u64,
    size: u64,
}

impl FileOps for ArchiveFile {
    fn version(&self) -> DispatchVersion {
        DispatchVersion::CURRENT
    }

    fn capabilities(&self) -> FileCaps {
        FileCaps::READ | FileCaps::SIZE | FileCaps::RANDOM_ACCESS | FileCaps::KIND
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::ArchiveMember
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let n = buf.len().min(usize::try_from(self.size - offset).unwrap_or(usize::MAX));
        self.container.file.read_at(self.offset + offset, &mut buf[..n])
    }

    fn size(&self) -> VfsResult<u64> {
        Ok(self.size)
    }

    fn kind(&self) -> VfsResult<StructuralType> {
        Ok(StructuralType::File)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::kar::KarBuilder;
    use crate::archive::open_archive;
    use crate::vfs::{MemoryFile, VirtualDirectory};

    fn archive() -> ArchiveDir {
        let mut builder = KarBuilder::new();
        builder
            .add_file("tbl/col/READ/data", b"ACGT".to_vec())
            .add_zombie("tbl/col/READ/idx2")
            .add_file("tbl/md/cur", b"".to_vec());
        let bytes = builder.to_bytes();
        let file = VirtualFile::new(Box::new(MemoryFile::from_bytes(bytes)), true, false).unwrap();
        let size = file.size().unwrap();
        let toc = crate::archive::kar::probe(&file, size).unwrap().unwrap();
        ArchiveDir::new(file, ArchiveFormat::Kar, toc)
    }

    #[test]
    fn test_member_reads_are_bounded() {
        let dir = archive();
        let file = dir.open_file_read("tbl/col/READ/data").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(file.read_at(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ACGT");
        assert_eq!(file.read_at(2, &mut buf).unwrap(), 2);
        assert_eq!(file.read_at(4, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_types_and_zombies() {
        let dir = archive();
        assert_eq!(dir.path_type("tbl/col"), StructuralType::Directory);
        assert_eq!(dir.path_type("tbl/col/READ/idx2"), StructuralType::ZombieFile);
        assert_eq!(dir.path_type("tbl/col/READ/data/x"), StructuralType::BadPath);
        assert_eq!(dir.path_type("nope"), StructuralType::NotFound);
        assert!(matches!(
            dir.open_file_read("tbl/col/READ/idx2"),
            Err(VfsError::NotFound(_))
        ));
        assert!(dir.has_zombies());
    }

    #[test]
    fn test_member_teardown_accounted() {
        let backend = Arc::new(archive());
        let dir = VirtualDirectory::new(backend.clone()).unwrap();
        assert!(dir.is_read_only());

        let sub = dir.open_dir_read("tbl/col/READ").unwrap();
        let data = sub.open_file_read("data").unwrap();
        assert_eq!(backend.open_members(), 1);
        assert_eq!(data.read_to_end().unwrap(), b"ACGT");

        data.release().unwrap();
        assert_eq!(backend.open_members(), 0);
    }

    #[test]
    fn test_open_archive_rejects_plain_file() {
        let file =
            VirtualFile::new(Box::new(MemoryFile::from_bytes(b"not an archive".to_vec())), true, false)
                .unwrap();
        assert!(open_archive(file, &ArchiveFormat::ALL).unwrap().is_none());
    }
}
