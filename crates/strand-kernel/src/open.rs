//! Expected-kind opening, writability checks and lock files.

use std::path::Path;
use std::sync::Arc;

use strand_types::StructuralType;

use crate::classify::{Classification, Classifier};
use crate::config::{IndexConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::index::ColumnIndexL1;
use crate::vfs::{LocalDir, VfsError, VirtualDirectory};

/// Advisory lock marker.
pub const LOCK_FILE: &str = "lock";
/// Permanent read-only marker.
pub const SEALED_FILE: &str = "sealed";

fn child(path: &str, name: &str) -> String {
    match path.trim_end_matches('/') {
        "" | "." => name.to_string(),
        p => format!("{p}/{name}"),
    }
}

fn mismatch(path: &str, expected: StructuralType, found: StructuralType) -> Error {
    if found.is_database_object() {
        Error::WrongKind {
            path: path.to_string(),
            expected,
            found,
        }
    } else {
        Error::invalid_path(format!("{path}: expected {expected}, found {found}"))
    }
}

/// Opens database objects by expected kind.
#[derive(Debug, Clone)]
pub struct OpenDispatcher {
    classifier: Classifier,
    index: IndexConfig,
    max_refs: u32,
}

impl Default for OpenDispatcher {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

impl OpenDispatcher {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            classifier: Classifier::new(&config.archive),
            index: config.index.clone(),
            max_refs: config.vfs.max_refs,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Root directory handle on the local filesystem.
    pub fn open_local(&self, root: impl AsRef<Path>) -> Result<VirtualDirectory> {
        let local = LocalDir::new(root.as_ref());
        if !local.root().is_dir() {
            return Err(Error::not_found(local.root().display().to_string()));
        }
        Ok(VirtualDirectory::with_ref_limit(Arc::new(local), self.max_refs)?)
    }

    pub fn classify(&self, dir: &VirtualDirectory, path: &str) -> Classification {
        self.classifier.classify(dir, path)
    }

    /// Open `path` as a directory of kind `expected`.
    ///
    /// Directories open for update when the medium allows it. Archive files
    /// open as read-only directories.
    #[tracing::instrument(level = "debug", skip(self, dir))]
    pub fn open_typed(
        &self,
        dir: &VirtualDirectory,
        path: &str,
        expected: StructuralType,
    ) -> Result<VirtualDirectory> {
        let raw = dir.path_type(path);
        match raw.ty {
            StructuralType::NotFound => Err(Error::not_found(path)),
            StructuralType::BadPath => Err(Error::invalid_path(path)),
            StructuralType::Directory => {
                let found = self.classifier.classify(dir, path).ty.ty;
                if !expected.accepts(found) {
                    return Err(mismatch(path, expected, found));
                }
                match dir.open_dir_update(path) {
                    Ok(opened) => Ok(opened),
                    Err(VfsError::ReadOnly(_) | VfsError::PermissionDenied(_) | VfsError::Unsupported(_)) => {
                        tracing::debug!(path, "opening read-only");
                        Ok(dir.open_dir_read(path)?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            StructuralType::File => {
                let resolved = self.classifier.resolve(dir, path);
                let found = resolved.class.ty.ty;
                match resolved.archive {
                    Some(archive) if expected.accepts(found) => Ok(archive),
                    _ => Err(mismatch(path, expected, found)),
                }
            }
            other => Err(Error::invalid_path(format!("{path}: cannot open a {other}"))),
        }
    }

    /// Open a column and load its level-1 index.
    pub fn open_column_index(&self, dir: &VirtualDirectory, path: &str) -> Result<ColumnIndexL1> {
        let column = self.open_typed(dir, path, StructuralType::Column)?;
        ColumnIndexL1::open(&column, &self.index)
    }

    /// Whether the object at `path` may be modified.
    pub fn is_writable(&self, dir: &VirtualDirectory, path: &str) -> Result<()> {
        if !dir.path_type(path).ty.exists() {
            return Err(Error::not_found(path));
        }
        for marker in [LOCK_FILE, SEALED_FILE] {
            let marker_path = child(path, marker);
            if dir.path_type(&marker_path).ty == StructuralType::File {
                return Err(Error::Locked(marker_path));
            }
        }
        if dir.is_read_only() {
            return Err(Error::ReadOnly(path.to_string()));
        }
        match dir.access(path) {
            Ok(perm) if perm & 0o222 == 0 => Err(Error::ReadOnly(format!("{path}: mode {perm:o}"))),
            Ok(_) | Err(VfsError::Unsupported(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the lock file inside `path`.
    pub fn lock(&self, dir: &VirtualDirectory, path: &str) -> Result<()> {
        self.is_writable(dir, path)?;
        let lock = child(path, LOCK_FILE);
        dir.create_file(&lock, 0o644)?;
        tracing::debug!(path = %lock, "locked");
        Ok(())
    }

    /// Remove the lock and sealed markers inside `path`, if present.
    pub fn unlock(&self, dir: &VirtualDirectory, path: &str) -> Result<()> {
        if dir.is_read_only() {
            return Err(Error::ReadOnly(path.to_string()));
        }
        for marker in [LOCK_FILE, SEALED_FILE] {
            match dir.remove(&child(path, marker)) {
                Ok(()) | Err(VfsError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::KarBuilder;
    use crate::error::ErrorKind;
    use crate::vfs::MemoryDir;

    fn store() -> (MemoryDir, VirtualDirectory) {
        let mem = MemoryDir::new();
        mem.write_file("db/tbl/run/col/READ/idx1", Vec::new()).unwrap();
        mem.write_file("db/tbl/run/col/READ/data", Vec::new()).unwrap();
        mem.write_file("db/tbl/run/md/cur", Vec::new()).unwrap();
        let dir = VirtualDirectory::new(Arc::new(mem.clone())).unwrap();
        (mem, dir)
    }

    #[test]
    fn test_open_matching_kind() {
        let (_mem, dir) = store();
        let open = OpenDispatcher::default();

        let table = open.open_typed(&dir, "db/tbl/run", StructuralType::Table).unwrap();
        assert!(!table.is_read_only());
        assert_eq!(table.path_type("col/READ"), StructuralType::Directory);
        open.open_typed(&dir, "db", StructuralType::Database).unwrap();
        open.open_typed(&dir, "db/tbl/run/col/READ", StructuralType::Column).unwrap();
    }

    #[test]
    fn test_open_wrong_kind() {
        let (_mem, dir) = store();
        let open = OpenDispatcher::default();

        let err = open.open_typed(&dir, "db", StructuralType::Table).unwrap_err();
        assert!(matches!(
            err,
            Error::WrongKind { expected: StructuralType::Table, found: StructuralType::Database, .. }
        ));
        assert_eq!(
            open.open_typed(&dir, "db/tbl", StructuralType::Table).unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
        open.open_typed(&dir, "db/tbl", StructuralType::Directory).unwrap();
        assert_eq!(
            open.open_typed(&dir, "nope", StructuralType::Table).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            open.open_typed(&dir, "db/tbl/run/md/cur/x", StructuralType::Table).unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn test_read_only_fallback() {
        let (mem, _) = store();
        let dir = VirtualDirectory::new(Arc::new(mem.to_read_only())).unwrap();
        let table = OpenDispatcher::default()
            .open_typed(&dir, "db/tbl/run", StructuralType::Table)
            .unwrap();
        assert!(table.is_read_only());
    }

    #[test]
    fn test_archive_file_opens_as_directory() {
        let (mem, dir) = store();
        let mut builder = KarBuilder::new();
        builder
            .add_file("col/READ/idx1", Vec::new())
            .add_file("col/READ/data", Vec::new())
            .add_file("meta", b"m".to_vec());
        mem.write_file("old.kar", builder.to_bytes()).unwrap();

        let open = OpenDispatcher::default();
        let table = open.open_typed(&dir, "old.kar", StructuralType::Table).unwrap();
        assert!(table.is_read_only());
        assert_eq!(table.path_type("meta"), StructuralType::File);

        let err = open.open_typed(&dir, "old.kar", StructuralType::Database).unwrap_err();
        assert!(matches!(err, Error::WrongKind { found: StructuralType::PrereleaseTable, .. }));

        mem.write_file("plain.txt", b"hello".to_vec()).unwrap();
        assert_eq!(
            open.open_typed(&dir, "plain.txt", StructuralType::Table).unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn test_writability() {
        let (mem, dir) = store();
        let open = OpenDispatcher::default();
        let run = "db/tbl/run";

        open.is_writable(&dir, run).unwrap();

        open.lock(&dir, run).unwrap();
        assert_eq!(open.is_writable(&dir, run).unwrap_err().kind(), ErrorKind::Locked);
        assert_eq!(open.lock(&dir, run).unwrap_err().kind(), ErrorKind::Locked);
        open.unlock(&dir, run).unwrap();
        open.is_writable(&dir, run).unwrap();

        mem.write_file("db/tbl/run/sealed", Vec::new()).unwrap();
        assert_eq!(open.is_writable(&dir, run).unwrap_err().kind(), ErrorKind::Locked);
        open.unlock(&dir, run).unwrap();

        mem.set_perm(run, 0o555).unwrap();
        assert_eq!(open.is_writable(&dir, run).unwrap_err().kind(), ErrorKind::ReadOnly);
        mem.set_perm(run, 0o755).unwrap();

        let ro = VirtualDirectory::new(Arc::new(mem.to_read_only())).unwrap();
        assert_eq!(open.is_writable(&ro, run).unwrap_err().kind(), ErrorKind::ReadOnly);
        assert_eq!(open.unlock(&ro, run).unwrap_err().kind(), ErrorKind::ReadOnly);
        assert_eq!(open.is_writable(&dir, "db/missing").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
