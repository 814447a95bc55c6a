//! Reference-counted handles over backends.
//!
//! [`VirtualFile`] and [`VirtualDirectory`] are the only way callers reach a
//! backend. Construction validates the backend's dispatch version and
//! capability declaration; every call checks the handle's enabled flags and
//! the backend's capabilities, so failure semantics are identical whatever
//! the medium.
//!
//! Handles are not `Clone`: [`VirtualFile::try_clone`] takes a new reference
//! and fails with [`VfsError::Exhausted`] at the configured ceiling. When the
//! last reference goes away the backend is torn down, through the owning
//! directory's [`DirOps::release_file`] hook if the file came from one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use strand_types::{PathType, StructuralType};

use super::error::{VfsError, VfsResult};
use super::ops::{DirOps, FileOps};
use super::types::{BackendKind, DirCaps, DirEntry, DispatchVersion, FileCaps};

/// Default reference ceiling per handle.
pub const DEFAULT_MAX_REFS: u32 = u32::MAX >> 1;

/// Saturating reference counter shared by all handles to one backend.
#[derive(Debug)]
struct RefCount {
    count: AtomicU32,
    limit: u32,
}

impl RefCount {
    fn new(limit: u32) -> Self {
        Self {
            count: AtomicU32::new(1),
            limit: limit.max(1),
        }
    }

    fn acquire(&self) -> VfsResult<()> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| VfsError::Exhausted(self.limit))
    }

    /// Returns true when this dropped the last reference.
    fn release(&self) -> bool {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous == 1,
            Err(_) => {
                tracing::error!("reference count released below zero");
                false
            }
        }
    }

    fn get(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

fn validate_file_dispatch(version: DispatchVersion, caps: FileCaps) -> VfsResult<()> {
    if !version.is_supported() {
        return Err(VfsError::BadVersion(version));
    }
    if !caps.intersects(FileCaps::READ | FileCaps::WRITE) {
        return Err(VfsError::Unsupported("file backend neither reads nor writes"));
    }
    if !caps.contains(FileCaps::mandatory(version.minor)) {
        return Err(VfsError::Unsupported("file backend missing mandatory operation"));
    }
    Ok(())
}

fn validate_dir_dispatch(version: DispatchVersion, caps: DirCaps) -> VfsResult<()> {
    if !version.is_supported() {
        return Err(VfsError::BadVersion(version));
    }
    if !caps.contains(DirCaps::mandatory(version.minor)) {
        return Err(VfsError::Unsupported("directory backend missing mandatory operation"));
    }
    Ok(())
}

/// Owning directory of a file, kept weak so files never keep archives alive.
struct FileOwner {
    dir: Weak<dyn DirOps>,
    path: String,
}

struct FileInner {
    backend: Box<dyn FileOps>,
    version: DispatchVersion,
    caps: FileCaps,
    read_enabled: bool,
    write_enabled: bool,
    refs: RefCount,
    owner: Option<FileOwner>,
    torn_down: AtomicBool,
}

impl FileInner {
    fn teardown(&self) -> VfsResult<()> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(owner) = &self.owner {
            if let Some(dir) = owner.dir.upgrade() {
                return dir.release_file(&owner.path, self.backend.as_ref());
            }
        }
        self.backend.close()
    }
}

impl Drop for FileInner {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!(error = %e, "file teardown failed");
        }
    }
}

/// Handle to an open file on any backend.
pub struct VirtualFile {
    inner: Arc<FileInner>,
}

impl fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFile")
            .field("backend", &self.inner.backend.backend_kind())
            .field("version", &self.inner.version)
            .field("read", &self.inner.read_enabled)
            .field("write", &self.inner.write_enabled)
            .field("refs", &self.inner.refs.get())
            .finish()
    }
}

impl VirtualFile {
    /// Wrap a backend, validating its dispatch declaration.
    pub fn new(backend: Box<dyn FileOps>, read: bool, write: bool) -> VfsResult<Self> {
        Self::build(backend, read, write, None, DEFAULT_MAX_REFS)
    }

    /// Like [`new`](Self::new) with an explicit reference ceiling.
    pub fn with_ref_limit(
        backend: Box<dyn FileOps>,
        read: bool,
        write: bool,
        max_refs: u32,
    ) -> VfsResult<Self> {
        Self::build(backend, read, write, None, max_refs)
    }

    fn build(
        backend: Box<dyn FileOps>,
        read: bool,
        write: bool,
        owner: Option<FileOwner>,
        max_refs: u32,
    ) -> VfsResult<Self> {
        let version = backend.version();
        let caps = backend.capabilities();
        validate_file_dispatch(version, caps)?;
        Ok(Self {
            inner: Arc::new(FileInner {
                backend,
                version,
                caps,
                read_enabled: read && caps.contains(FileCaps::READ),
                write_enabled: write && caps.contains(FileCaps::WRITE),
                refs: RefCount::new(max_refs),
                owner,
                torn_down: AtomicBool::new(false),
            }),
        })
    }

    /// Take another reference to the same open file.
    pub fn try_clone(&self) -> VfsResult<Self> {
        self.inner.refs.acquire()?;
        Ok(Self {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Drop this reference; if it was the last, tear down now and report
    /// any teardown error instead of logging it.
    pub fn release(self) -> VfsResult<()> {
        let inner = Arc::clone(&self.inner);
        drop(self);
        if inner.refs.get() == 0 {
            inner.teardown()
        } else {
            Ok(())
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.inner.refs.get()
    }

    pub fn version(&self) -> DispatchVersion {
        self.inner.version
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.backend_kind()
    }

    pub fn can_read(&self) -> bool {
        self.inner.read_enabled
    }

    pub fn can_write(&self) -> bool {
        self.inner.write_enabled
    }

    fn require(&self, cap: FileCaps, op: &'static str) -> VfsResult<()> {
        if self.inner.caps.contains(cap) {
            Ok(())
        } else {
            Err(VfsError::Unsupported(op))
        }
    }

    /// Read up to `buf.len()` bytes at `offset`; may short-count.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        if !self.inner.read_enabled {
            return Err(VfsError::AccessDenied("read"));
        }
        self.inner.backend.read_at(offset, buf)
    }

    /// Read with a timeout hint; backends without timed reads ignore it.
    pub fn timed_read_at(
        &self,
        offset: u64,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> VfsResult<usize> {
        if !self.inner.read_enabled {
            return Err(VfsError::AccessDenied("read"));
        }
        if self.inner.caps.contains(FileCaps::TIMED_READ) {
            self.inner.backend.timed_read_at(offset, buf, timeout)
        } else {
            self.inner.backend.read_at(offset, buf)
        }
    }

    /// Read until `buf` is full or the backend makes no progress.
    ///
    /// A short count means end of stream, not an error.
    pub fn read_all_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.read_at(offset + total as u64, &mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        if !self.inner.write_enabled {
            return Err(VfsError::AccessDenied("write"));
        }
        self.inner.backend.write_at(offset, buf)
    }

    /// Write until `buf` is consumed or the backend makes no progress.
    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.write_at(offset + total as u64, &buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    pub fn size(&self) -> VfsResult<u64> {
        self.require(FileCaps::SIZE, "size")?;
        self.inner.backend.size()
    }

    pub fn set_size(&self, size: u64) -> VfsResult<()> {
        if !self.inner.write_enabled {
            return Err(VfsError::AccessDenied("write"));
        }
        self.require(FileCaps::SET_SIZE, "set_size")?;
        self.inner.backend.set_size(size)
    }

    pub fn random_access(&self) -> bool {
        self.inner.backend.random_access()
    }

    /// Medium-level kind. Backends declaring 1.0 predate this call.
    pub fn kind(&self) -> VfsResult<StructuralType> {
        if !self.inner.version.has_minor(1) {
            return Err(VfsError::Unsupported("kind"));
        }
        self.inner.backend.kind()
    }

    /// Read the whole file into memory.
    pub fn read_to_end(&self) -> VfsResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size)
            .map_err(|_| VfsError::other(format!("file of {size} bytes does not fit in memory")))?;
        let mut buf = vec![0u8; len];
        let n = self.read_all_at(0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl Drop for VirtualFile {
    fn drop(&mut self) {
        self.inner.refs.release();
    }
}

struct DirInner {
    backend: Arc<dyn DirOps>,
    version: DispatchVersion,
    caps: DirCaps,
    read_only: bool,
    refs: RefCount,
}

/// Handle to a directory on any backend.
pub struct VirtualDirectory {
    inner: Arc<DirInner>,
}

impl fmt::Debug for VirtualDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDirectory")
            .field("backend", &self.inner.backend.backend_kind())
            .field("version", &self.inner.version)
            .field("read_only", &self.inner.read_only)
            .field("refs", &self.inner.refs.get())
            .finish()
    }
}

impl VirtualDirectory {
    /// Wrap a backend, validating its dispatch declaration.
    ///
    /// The handle is writable unless the backend itself is read-only.
    pub fn new(backend: Arc<dyn DirOps>) -> VfsResult<Self> {
        let read_only = backend.read_only();
        Self::build(backend, read_only, DEFAULT_MAX_REFS)
    }

    /// Wrap a backend as a read-only handle.
    pub fn new_read_only(backend: Arc<dyn DirOps>) -> VfsResult<Self> {
        Self::build(backend, true, DEFAULT_MAX_REFS)
    }

    /// Like [`new`](Self::new) with an explicit reference ceiling, inherited
    /// by every handle opened through this one.
    pub fn with_ref_limit(backend: Arc<dyn DirOps>, max_refs: u32) -> VfsResult<Self> {
        let read_only = backend.read_only();
        Self::build(backend, read_only, max_refs)
    }

    fn build(backend: Arc<dyn DirOps>, read_only: bool, max_refs: u32) -> VfsResult<Self> {
        let version = backend.version();
        let caps = backend.capabilities();
        validate_dir_dispatch(version, caps)?;
        Ok(Self {
            inner: Arc::new(DirInner {
                read_only: read_only || backend.read_only(),
                backend,
                version,
                caps,
                refs: RefCount::new(max_refs),
            }),
        })
    }

    pub fn try_clone(&self) -> VfsResult<Self> {
        self.inner.refs.acquire()?;
        Ok(Self {
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn ref_count(&self) -> u32 {
        self.inner.refs.get()
    }

    pub fn version(&self) -> DispatchVersion {
        self.inner.version
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.backend_kind()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    fn require(&self, cap: DirCaps, op: &'static str) -> VfsResult<()> {
        if self.inner.caps.contains(cap) {
            Ok(())
        } else {
            Err(VfsError::Unsupported(op))
        }
    }

    fn require_writable(&self, path: &str) -> VfsResult<()> {
        if self.inner.read_only {
            Err(VfsError::read_only(path))
        } else {
            Ok(())
        }
    }

    fn wrap_file(&self, path: &str, backend: Box<dyn FileOps>, write: bool) -> VfsResult<VirtualFile> {
        let owner = self.inner.backend.owns_files().then(|| FileOwner {
            dir: Arc::downgrade(&self.inner.backend),
            path: path.to_string(),
        });
        VirtualFile::build(backend, true, write, owner, self.inner.refs.limit)
    }

    fn wrap_dir(&self, backend: Arc<dyn DirOps>, read_only: bool) -> VfsResult<VirtualDirectory> {
        VirtualDirectory::build(backend, read_only, self.inner.refs.limit)
    }

    /// Immediate children of `path`, sorted by name.
    pub fn list(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        self.require(DirCaps::LIST, "list")?;
        self.inner.backend.list(path)
    }

    /// Raw medium type of `path`.
    pub fn path_type(&self, path: &str) -> PathType {
        self.inner.backend.path_type(path)
    }

    pub fn resolve_path(&self, path: &str) -> VfsResult<String> {
        self.require(DirCaps::RESOLVE, "resolve_path")?;
        self.inner.backend.resolve_path(path)
    }

    pub fn open_file_read(&self, path: &str) -> VfsResult<VirtualFile> {
        self.require(DirCaps::OPEN_FILE, "open_file_read")?;
        let backend = self.inner.backend.open_file_read(path)?;
        self.wrap_file(path, backend, false)
    }

    pub fn open_file_update(&self, path: &str) -> VfsResult<VirtualFile> {
        self.require(DirCaps::OPEN_FILE, "open_file_update")?;
        self.require_writable(path)?;
        let backend = self.inner.backend.open_file_update(path)?;
        self.wrap_file(path, backend, true)
    }

    /// Create (or truncate) a file and open it for update.
    pub fn create_file(&self, path: &str, mode: u32) -> VfsResult<VirtualFile> {
        self.require(DirCaps::CREATE, "create_file")?;
        self.require_writable(path)?;
        let backend = self.inner.backend.create_file(path, mode)?;
        self.wrap_file(path, backend, true)
    }

    pub fn open_dir_read(&self, path: &str) -> VfsResult<VirtualDirectory> {
        self.require(DirCaps::OPEN_DIR, "open_dir_read")?;
        let backend = self.inner.backend.open_dir_read(path)?;
        self.wrap_dir(backend, true)
    }

    pub fn open_dir_update(&self, path: &str) -> VfsResult<VirtualDirectory> {
        self.require(DirCaps::OPEN_DIR, "open_dir_update")?;
        self.require_writable(path)?;
        let backend = self.inner.backend.open_dir_update(path)?;
        self.wrap_dir(backend, false)
    }

    pub fn create_dir(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.require(DirCaps::CREATE, "create_dir")?;
        self.require_writable(path)?;
        self.inner.backend.create_dir(path, mode)
    }

    pub fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.require(DirCaps::RENAME, "rename")?;
        self.require_writable(from)?;
        self.inner.backend.rename(from, to)
    }

    pub fn remove(&self, path: &str) -> VfsResult<()> {
        self.require(DirCaps::REMOVE, "remove")?;
        self.require_writable(path)?;
        self.inner.backend.remove(path)
    }

    /// Permission bits of `path`. Backends declaring 1.0 predate this call.
    pub fn access(&self, path: &str) -> VfsResult<u32> {
        if !self.inner.version.has_minor(1) {
            return Err(VfsError::Unsupported("access"));
        }
        self.inner.backend.access(path)
    }

    /// Walk entries under `path`, calling `visit` with each entry's path
    /// relative to `path`. Recurses into subdirectories when `recurse` is set.
    pub fn visit<F>(&self, path: &str, recurse: bool, visit: &mut F) -> VfsResult<()>
    where
        F: FnMut(&str, &DirEntry) -> VfsResult<()>,
    {
        self.visit_inner(path, "", recurse, visit)
    }

    fn visit_inner<F>(&self, base: &str, rel: &str, recurse: bool, visit: &mut F) -> VfsResult<()>
    where
        F: FnMut(&str, &DirEntry) -> VfsResult<()>,
    {
        let dir_path = if rel.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{rel}")
        };
        for entry in self.list(&dir_path)? {
            let child = if rel.is_empty() {
                entry.name.clone()
            } else {
                format!("{rel}/{}", entry.name)
            };
            visit(&child, &entry)?;
            if recurse && entry.kind.ty == StructuralType::Directory && !entry.kind.alias {
                self.visit_inner(base, &child, recurse, visit)?;
            }
        }
        Ok(())
    }
}

impl Drop for VirtualDirectory {
    fn drop(&mut self) {
        self.inner.refs.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::vfs::backends::{MemoryDir, MemoryFile};

    /// File backend with a configurable declaration.
    struct Declared {
        version: DispatchVersion,
        caps: FileCaps,
    }

    impl FileOps for Declared {
        fn version(&self) -> DispatchVersion {
            self.version
        }

        fn capabilities(&self) -> FileCaps {
            self.caps
        }

        fn backend_kind(&self) -> BackendKind {
            BackendKind::External
        }

        fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> VfsResult<usize> {
            Ok(0)
        }
    }

    fn declared(major: u16, minor: u16, caps: FileCaps) -> Box<dyn FileOps> {
        Box::new(Declared {
            version: DispatchVersion { major, minor },
            caps,
        })
    }

    #[test]
    fn test_rejects_unknown_major_version() {
        let result = VirtualFile::new(declared(2, 0, FileCaps::READ), true, false);
        assert!(matches!(result, Err(VfsError::BadVersion(v)) if v.major == 2));

        let result = VirtualFile::new(declared(1, 7, FileCaps::all()), true, false);
        assert!(matches!(result, Err(VfsError::BadVersion(_))));
    }

    #[test]
    fn test_rejects_missing_mandatory_ops() {
        // 1.1 requires kind
        let result = VirtualFile::new(declared(1, 1, FileCaps::READ), true, false);
        assert!(matches!(result, Err(VfsError::Unsupported(_))));

        let result = VirtualFile::new(declared(1, 0, FileCaps::SIZE), true, false);
        assert!(matches!(result, Err(VfsError::Unsupported(_))));
    }

    #[test]
    fn test_v1_0_backend_has_no_kind() {
        let file = VirtualFile::new(declared(1, 0, FileCaps::READ), true, false).unwrap();
        assert!(matches!(file.kind(), Err(VfsError::Unsupported("kind"))));
        // size is not declared either
        assert!(matches!(file.size(), Err(VfsError::Unsupported("size"))));
    }

    #[test]
    fn test_read_and_write_flags() {
        let file = VirtualFile::new(Box::new(MemoryFile::from_bytes(b"abc".to_vec())), true, false)
            .unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(file.read_at(0, &mut buf).unwrap(), 3);
        assert!(matches!(file.write_at(0, b"x"), Err(VfsError::AccessDenied("write"))));

        let write_only =
            VirtualFile::new(Box::new(MemoryFile::from_bytes(Vec::new())), false, true).unwrap();
        assert!(matches!(write_only.read_at(0, &mut buf), Err(VfsError::AccessDenied("read"))));
    }

    #[test]
    fn test_ref_ceiling() {
        let file =
            VirtualFile::with_ref_limit(Box::new(MemoryFile::from_bytes(Vec::new())), true, false, 2)
                .unwrap();
        let second = file.try_clone().unwrap();
        assert_eq!(file.ref_count(), 2);
        assert!(matches!(file.try_clone(), Err(VfsError::Exhausted(2))));

        drop(second);
        assert_eq!(file.ref_count(), 1);
        assert!(file.try_clone().is_ok());
    }

    /// Directory that records which files were released through it.
    struct Owning {
        inner: MemoryDir,
        released: Mutex<Vec<String>>,
    }

    impl DirOps for Owning {
        fn version(&self) -> DispatchVersion {
            DispatchVersion::CURRENT
        }

        fn capabilities(&self) -> DirCaps {
            DirCaps::all()
        }

        fn backend_kind(&self) -> BackendKind {
            BackendKind::External
        }

        fn read_only(&self) -> bool {
            true
        }

        fn list(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
            self.inner.list(path)
        }

        fn path_type(&self, path: &str) -> PathType {
            self.inner.path_type(path)
        }

        fn open_file_read(&self, path: &str) -> VfsResult<Box<dyn FileOps>> {
            self.inner.open_file_read(path)
        }

        fn open_dir_read(&self, path: &str) -> VfsResult<Arc<dyn DirOps>> {
            self.inner.open_dir_read(path)
        }

        fn owns_files(&self) -> bool {
            true
        }

        fn release_file(&self, path: &str, _file: &dyn FileOps) -> VfsResult<()> {
            self.released.lock().unwrap().push(path.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_owned_file_teardown_goes_through_directory() {
        let mem = MemoryDir::new();
        mem.write_file("member", b"payload".to_vec()).unwrap();
        let backend = Arc::new(Owning {
            inner: mem,
            released: Mutex::new(Vec::new()),
        });
        let dir = VirtualDirectory::new(backend.clone()).unwrap();

        let file = dir.open_file_read("member").unwrap();
        let clone = file.try_clone().unwrap();
        drop(file);
        assert!(backend.released.lock().unwrap().is_empty());

        clone.release().unwrap();
        assert_eq!(*backend.released.lock().unwrap(), vec!["member".to_string()]);
    }

    #[test]
    fn test_read_only_directory_refuses_writes() {
        let dir = VirtualDirectory::new_read_only(Arc::new(MemoryDir::new())).unwrap();
        assert!(dir.is_read_only());
        assert!(matches!(dir.create_file("x", 0o644), Err(VfsError::ReadOnly(_))));
        assert!(matches!(dir.create_dir("d", 0o755), Err(VfsError::ReadOnly(_))));
    }

    #[test]
    fn test_child_directory_inherits_limit() {
        let mem = MemoryDir::new();
        mem.mkdir("sub").unwrap();
        let dir = VirtualDirectory::with_ref_limit(Arc::new(mem), 1).unwrap();
        let sub = dir.open_dir_read("sub").unwrap();
        assert!(sub.is_read_only());
        assert!(matches!(sub.try_clone(), Err(VfsError::Exhausted(1))));
    }

    #[test]
    fn test_visit_recurses() {
        let mem = MemoryDir::new();
        mem.write_file("a/b/c", Vec::new()).unwrap();
        mem.write_file("top", Vec::new()).unwrap();
        let dir = VirtualDirectory::new(Arc::new(mem)).unwrap();

        let mut seen = Vec::new();
        dir.visit("", true, &mut |path, _| {
            seen.push(path.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["a", "a/b", "a/b/c", "top"]);
    }
}
