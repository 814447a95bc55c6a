//! Backend operation traits.
//!
//! A backend implements only what its medium supports and declares that set
//! through `capabilities()`. Every other operation keeps its default body,
//! which answers [`VfsError::Unsupported`]. The handles in
//! [`super::handle`] are the single gate that checks versions and
//! capabilities before anything reaches a backend.

use std::sync::Arc;
use std::time::Duration;

use strand_types::{PathType, StructuralType};

use super::error::{VfsError, VfsResult};
use super::types::{BackendKind, DirCaps, DirEntry, DispatchVersion, FileCaps};

/// Byte-range operations on one open file.
///
/// All methods take `&self`: backends that advertise random access must
/// tolerate concurrent `read_at` calls. Serializing writers is the caller's
/// job.
pub trait FileOps: Send + Sync {
    /// Operation set version this backend was written against.
    fn version(&self) -> DispatchVersion;

    /// Operations implemented.
    fn capabilities(&self) -> FileCaps;

    fn backend_kind(&self) -> BackendKind;

    /// Read up to `buf.len()` bytes at `offset`. Returns 0 at end of file.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let _ = (offset, buf);
        Err(VfsError::Unsupported("read_at"))
    }

    /// Write up to `buf.len()` bytes at `offset`.
    fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        let _ = (offset, buf);
        Err(VfsError::Unsupported("write_at"))
    }

    /// Like `read_at`, bounded by `timeout` when the medium can honor one.
    fn timed_read_at(
        &self,
        offset: u64,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> VfsResult<usize> {
        let _ = timeout;
        self.read_at(offset, buf)
    }

    fn size(&self) -> VfsResult<u64> {
        Err(VfsError::Unsupported("size"))
    }

    fn set_size(&self, size: u64) -> VfsResult<()> {
        let _ = size;
        Err(VfsError::Unsupported("set_size"))
    }

    /// Whether reads at arbitrary offsets are serviced.
    fn random_access(&self) -> bool {
        self.capabilities().contains(FileCaps::RANDOM_ACCESS)
    }

    /// Medium-level kind of the open file (since 1.1).
    fn kind(&self) -> VfsResult<StructuralType> {
        Err(VfsError::Unsupported("kind"))
    }

    /// Backend teardown, run once when the last handle goes away and no
    /// owning directory claims the file.
    fn close(&self) -> VfsResult<()> {
        Ok(())
    }
}

/// Enumeration, path resolution and sub-object opening.
///
/// Paths are `/`-separated and relative to the directory.
pub trait DirOps: Send + Sync {
    fn version(&self) -> DispatchVersion;

    fn capabilities(&self) -> DirCaps;

    fn backend_kind(&self) -> BackendKind;

    /// Whether the backing medium refuses all modification.
    fn read_only(&self) -> bool;

    /// Immediate children of `path`, sorted by name.
    fn list(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    /// Raw type of `path` on the medium. Never fails: problems are reported
    /// as `NotFound` or `BadPath`.
    fn path_type(&self, path: &str) -> PathType;

    /// Medium-specific full path, for diagnostics and parent-name checks.
    fn resolve_path(&self, path: &str) -> VfsResult<String> {
        let _ = path;
        Err(VfsError::Unsupported("resolve_path"))
    }

    fn open_file_read(&self, path: &str) -> VfsResult<Box<dyn FileOps>>;

    fn open_file_update(&self, path: &str) -> VfsResult<Box<dyn FileOps>> {
        let _ = path;
        Err(VfsError::Unsupported("open_file_update"))
    }

    fn create_file(&self, path: &str, mode: u32) -> VfsResult<Box<dyn FileOps>> {
        let _ = (path, mode);
        Err(VfsError::Unsupported("create_file"))
    }

    fn open_dir_read(&self, path: &str) -> VfsResult<Arc<dyn DirOps>>;

    fn open_dir_update(&self, path: &str) -> VfsResult<Arc<dyn DirOps>> {
        let _ = path;
        Err(VfsError::Unsupported("open_dir_update"))
    }

    fn create_dir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let _ = (path, mode);
        Err(VfsError::Unsupported("create_dir"))
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let _ = (from, to);
        Err(VfsError::Unsupported("rename"))
    }

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> VfsResult<()> {
        let _ = path;
        Err(VfsError::Unsupported("remove"))
    }

    /// Permission bits of `path` (since 1.1).
    fn access(&self, path: &str) -> VfsResult<u32> {
        let _ = path;
        Err(VfsError::Unsupported("access"))
    }

    /// Whether files opened here must be torn down through
    /// [`release_file`](Self::release_file).
    fn owns_files(&self) -> bool {
        false
    }

    /// Teardown hook for a file this directory opened. The default just
    /// closes the file.
    fn release_file(&self, path: &str, file: &dyn FileOps) -> VfsResult<()> {
        let _ = path;
        file.close()
    }
}
