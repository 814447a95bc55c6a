//! Local filesystem backend.
//!
//! Provides access to real filesystem paths, with path security
//! to prevent escaping the root directory.

use std::fs;
use std::os::unix::fs::{DirBuilderExt, FileExt, FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use strand_types::{PathType, StructuralType};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{DirOps, FileOps};
use crate::vfs::types::{BackendKind, DirCaps, DirEntry, DispatchVersion, FileCaps};

/// Local filesystem directory.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/data/SRR000001`, then `list("col/READ")` lists
/// `/data/SRR000001/col/READ`.
///
/// Path security is enforced: attempts to escape via `..` are blocked.
#[derive(Debug, Clone)]
pub struct LocalDir {
    root: PathBuf,
    read_only: bool,
}

impl LocalDir {
    /// Create a directory backend rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            read_only: false,
        }
    }

    /// Create a read-only directory backend.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(root)
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// Components are checked lexically, so `..` may step back into the
    /// root but never above it. Symlinks inside the root are left alone:
    /// they are reported as aliases, not followed here.
    fn resolve(&self, path: &str) -> VfsResult<PathBuf> {
        if path.contains('\0') {
            return Err(VfsError::invalid_path(path.replace('\0', "\\0")));
        }
        let path = Path::new(path.strip_prefix('/').unwrap_or(path));
        let mut full = self.root.clone();
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Normal(name) => {
                    full.push(name);
                    depth += 1;
                }
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(VfsError::path_escapes_root(format!(
                            "{} is not under {}",
                            path.display(),
                            self.root.display()
                        )));
                    }
                    full.pop();
                    depth -= 1;
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Ok(full)
    }

    fn check_writable(&self, path: &str) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::read_only(path))
        } else {
            Ok(())
        }
    }

    fn raw_type(meta: &fs::Metadata) -> StructuralType {
        let ft = meta.file_type();
        if ft.is_dir() {
            StructuralType::Directory
        } else if ft.is_file() {
            StructuralType::File
        } else if ft.is_char_device() {
            StructuralType::CharDevice
        } else if ft.is_block_device() {
            StructuralType::BlockDevice
        } else if ft.is_fifo() {
            StructuralType::Fifo
        } else if ft.is_socket() {
            StructuralType::Socket
        } else {
            StructuralType::BadPath
        }
    }

    fn type_of(full: &Path) -> PathType {
        let meta = match fs::symlink_metadata(full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PathType::new(StructuralType::NotFound);
            }
            Err(_) => return PathType::new(StructuralType::BadPath),
        };
        if !meta.file_type().is_symlink() {
            return PathType::new(Self::raw_type(&meta));
        }
        match fs::metadata(full) {
            Ok(target) => PathType::aliased(Self::raw_type(&target)),
            Err(_) => PathType::aliased(StructuralType::NotFound),
        }
    }

    fn child(&self, full: PathBuf, read_only: bool) -> LocalDir {
        LocalDir {
            root: dunce::canonicalize(&full).unwrap_or(full),
            read_only,
        }
    }

    fn open_dir(&self, path: &str, read_only: bool) -> VfsResult<Arc<dyn DirOps>> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).map_err(|e| VfsError::from_io(e, path))?;
        if !meta.is_dir() {
            return Err(VfsError::not_a_directory(path));
        }
        Ok(Arc::new(self.child(full, read_only)))
    }
}

impl DirOps for LocalDir {
    fn version(&self) -> DispatchVersion {
        DispatchVersion::CURRENT
    }

    fn capabilities(&self) -> DirCaps {
        DirCaps::all()
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn list(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let full = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| VfsError::from_io(e, path))? {
            let entry = entry?;
            let kind = Self::type_of(&entry.path());
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn path_type(&self, path: &str) -> PathType {
        match self.resolve(path) {
            Ok(full) => Self::type_of(&full),
            Err(_) => PathType::new(StructuralType::BadPath),
        }
    }

    fn resolve_path(&self, path: &str) -> VfsResult<String> {
        Ok(self.resolve(path)?.to_string_lossy().into_owned())
    }

    fn open_file_read(&self, path: &str) -> VfsResult<Box<dyn FileOps>> {
        let full = self.resolve(path)?;
        let file = fs::File::open(&full).map_err(|e| VfsError::from_io(e, path))?;
        if file.metadata()?.is_dir() {
            return Err(VfsError::is_a_directory(path));
        }
        Ok(Box::new(LocalFile { file }))
    }

    fn open_file_update(&self, path: &str) -> VfsResult<Box<dyn FileOps>> {
        self.check_writable(path)?;
        let full = self.resolve(path)?;
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&full)
            .map_err(|e| VfsError::from_io(e, path))?;
        Ok(Box::new(LocalFile { file }))
    }

    fn create_file(&self, path: &str, mode: u32) -> VfsResult<Box<dyn FileOps>> {
        self.check_writable(path)?;
        let full = self.resolve(path)?;

        // Ensure parent directory exists
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&full)
            .map_err(|e| VfsError::from_io(e, path))?;
        Ok(Box::new(LocalFile { file }))
    }

    fn open_dir_read(&self, path: &str) -> VfsResult<Arc<dyn DirOps>> {
        self.open_dir(path, true)
    }

    fn open_dir_update(&self, path: &str) -> VfsResult<Arc<dyn DirOps>> {
        self.check_writable(path)?;
        self.open_dir(path, false)
    }

    fn create_dir(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.check_writable(path)?;
        let full = self.resolve(path)?;
        fs::DirBuilder::new()
            .mode(mode)
            .recursive(true)
            .create(&full)
            .map_err(|e| VfsError::from_io(e, path))
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.check_writable(from)?;
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;

        // Ensure parent of destination exists
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::rename(&from_path, &to_path).map_err(|e| VfsError::from_io(e, from))
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        self.check_writable(path)?;
        let full = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full).map_err(|e| VfsError::from_io(e, path))?;
        if meta.is_dir() {
            fs::remove_dir(&full).map_err(|e| VfsError::from_io(e, path))
        } else {
            fs::remove_file(&full).map_err(|e| VfsError::from_io(e, path))
        }
    }

    fn access(&self, path: &str) -> VfsResult<u32> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).map_err(|e| VfsError::from_io(e, path))?;
        Ok(meta.permissions().mode() & 0o7777)
    }
}

/// Open file on the local filesystem. Positioned I/O, no shared cursor.
#[derive(Debug)]
pub struct LocalFile {
    file: fs::File,
}

impl FileOps for LocalFile {
    fn version(&self) -> DispatchVersion {
        DispatchVersion::CURRENT
    }

    fn capabilities(&self) -> FileCaps {
        FileCaps::READ
            | FileCaps::WRITE
            | FileCaps::SIZE
            | FileCaps::SET_SIZE
            | FileCaps::RANDOM_ACCESS
            | FileCaps::KIND
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        loop {
            match self.file.read_at(buf, offset) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        loop {
            match self.file.write_at(buf, offset) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn size(&self) -> VfsResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_size(&self, size: u64) -> VfsResult<()> {
        Ok(self.file.set_len(size)?)
    }

    fn kind(&self) -> VfsResult<StructuralType> {
        Ok(LocalDir::raw_type(&self.file.metadata()?))
    }
}
