//! In-memory filesystem backend.
//!
//! Used for scratch space and testing. All data is ephemeral. Entries can be
//! marked as zombies to stand in for deleted-but-unreclaimed files.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use strand_types::{PathType, StructuralType};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{DirOps, FileOps};
use crate::vfs::path;
use crate::vfs::types::{BackendKind, DirCaps, DirEntry, DispatchVersion, FileCaps};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Arc<RwLock<Vec<u8>>>,
        perm: u32,
        zombie: bool,
    },
    Directory {
        perm: u32,
    },
    Symlink {
        target: String,
    },
}

impl Entry {
    fn structural_type(&self) -> StructuralType {
        match self {
            Entry::File { zombie: true, .. } => StructuralType::ZombieFile,
            Entry::File { .. } => StructuralType::File,
            Entry::Directory { .. } => StructuralType::Directory,
            Entry::Symlink { .. } => StructuralType::NotFound,
        }
    }
}

/// Shared tree; keys are normalized paths, the root is `""`.
#[derive(Debug)]
struct MemoryTree {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryTree {
    fn new() -> Self {
        let mut entries = BTreeMap::new();
        // Root directory always exists
        entries.insert(String::new(), Entry::Directory { perm: 0o755 });
        Self {
            entries: RwLock::new(entries),
        }
    }
}

/// In-memory directory backend.
///
/// Thread-safe via an internal `RwLock`. Sub-directories opened from a
/// `MemoryDir` share its tree, so writes through one are visible through all.
#[derive(Debug, Clone)]
pub struct MemoryDir {
    tree: Arc<MemoryTree>,
    base: String,
    read_only: bool,
}

impl Default for MemoryDir {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDir {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        Self {
            tree: Arc::new(MemoryTree::new()),
            base: String::new(),
            read_only: false,
        }
    }

    /// Same tree, no modification allowed through this backend.
    pub fn to_read_only(&self) -> Self {
        Self {
            read_only: true,
            ..self.clone()
        }
    }

    fn full(&self, rel: &str) -> VfsResult<String> {
        path::join(&self.base, rel)
    }

    /// Ensure all parent directories of a normalized path exist.
    fn ensure_parents(entries: &mut BTreeMap<String, Entry>, full: &str) -> VfsResult<()> {
        let mut current = String::new();
        let Some(parent) = path::parent(full) else {
            return Ok(());
        };
        for component in parent.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            match entries.get(&current) {
                Some(Entry::Directory { .. }) => {}
                Some(_) => return Err(VfsError::not_a_directory(current.clone())),
                None => {
                    entries.insert(current.clone(), Entry::Directory { perm: 0o755 });
                }
            }
        }
        Ok(())
    }

    /// Follow one symlink hop. Returns the target key and whether a link
    /// was traversed.
    fn follow(entries: &BTreeMap<String, Entry>, full: &str) -> (String, bool) {
        match entries.get(full) {
            Some(Entry::Symlink { target }) => {
                let resolved = match path::parent(full) {
                    Some(parent) => path::join(parent, target),
                    None => path::normalize(target),
                };
                (resolved.unwrap_or_default(), true)
            }
            _ => (full.to_string(), false),
        }
    }

    /// Write a whole file, creating parents as needed.
    pub fn write_file(&self, rel: &str, data: impl Into<Vec<u8>>) -> VfsResult<()> {
        let full = self.full(rel)?;
        let mut entries = self.tree.entries.write();
        Self::ensure_parents(&mut entries, &full)?;
        if let Some(Entry::Directory { .. }) = entries.get(&full) {
            return Err(VfsError::is_a_directory(full));
        }
        entries.insert(
            full,
            Entry::File {
                data: Arc::new(RwLock::new(data.into())),
                perm: 0o644,
                zombie: false,
            },
        );
        Ok(())
    }

    /// Create a directory and its parents.
    pub fn mkdir(&self, rel: &str) -> VfsResult<()> {
        let full = self.full(rel)?;
        let mut entries = self.tree.entries.write();
        Self::ensure_parents(&mut entries, &full)?;
        match entries.get(&full) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(_) => Err(VfsError::already_exists(full)),
            None => {
                entries.insert(full, Entry::Directory { perm: 0o755 });
                Ok(())
            }
        }
    }

    /// Create a symbolic link at `rel` pointing to `target` (relative to
    /// the link's parent).
    pub fn symlink(&self, rel: &str, target: &str) -> VfsResult<()> {
        let full = self.full(rel)?;
        let mut entries = self.tree.entries.write();
        Self::ensure_parents(&mut entries, &full)?;
        if entries.contains_key(&full) {
            return Err(VfsError::already_exists(full));
        }
        entries.insert(
            full,
            Entry::Symlink {
                target: target.to_string(),
            },
        );
        Ok(())
    }

    /// Flag a file as deleted but not yet reclaimed.
    pub fn mark_zombie(&self, rel: &str) -> VfsResult<()> {
        let full = self.full(rel)?;
        let mut entries = self.tree.entries.write();
        match entries.get_mut(&full) {
            Some(Entry::File { zombie, .. }) => {
                *zombie = true;
                Ok(())
            }
            Some(_) => Err(VfsError::is_a_directory(full)),
            None => Err(VfsError::not_found(full)),
        }
    }

    /// Change permission bits of a file or directory.
    pub fn set_perm(&self, rel: &str, new_perm: u32) -> VfsResult<()> {
        let full = self.full(rel)?;
        let mut entries = self.tree.entries.write();
        match entries.get_mut(&full) {
            Some(Entry::File { perm, .. }) | Some(Entry::Directory { perm }) => {
                *perm = new_perm;
                Ok(())
            }
            Some(Entry::Symlink { .. }) => Err(VfsError::other("cannot chmod a symlink")),
            None => Err(VfsError::not_found(full)),
        }
    }

    fn open_file(&self, rel: &str, writable: bool) -> VfsResult<Box<dyn FileOps>> {
        let full = self.full(rel)?;
        let entries = self.tree.entries.read();
        let (target, _) = Self::follow(&entries, &full);
        match entries.get(&target) {
            Some(Entry::File { zombie: true, .. }) => Err(VfsError::not_found(full)),
            Some(Entry::File { data, .. }) => Ok(Box::new(MemoryFile {
                data: Arc::clone(data),
                writable,
            })),
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(full)),
            _ => Err(VfsError::not_found(full)),
        }
    }

    fn open_dir(&self, rel: &str, read_only: bool) -> VfsResult<Arc<dyn DirOps>> {
        let full = self.full(rel)?;
        let entries = self.tree.entries.read();
        let (target, _) = Self::follow(&entries, &full);
        match entries.get(&target) {
            Some(Entry::Directory { .. }) => Ok(Arc::new(MemoryDir {
                tree: Arc::clone(&self.tree),
                base: target,
                read_only,
            })),
            Some(_) => Err(VfsError::not_a_directory(full)),
            None => Err(VfsError::not_found(full)),
        }
    }

    fn check_writable(&self, rel: &str) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::read_only(rel))
        } else {
            Ok(())
        }
    }
}

impl DirOps for MemoryDir {
    fn version(&self) -> DispatchVersion {
        DispatchVersion::CURRENT
    }

    fn capabilities(&self) -> DirCaps {
        DirCaps::all()
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn list(&self, rel: &str) -> VfsResult<Vec<DirEntry>> {
        let full = self.full(rel)?;
        let entries = self.tree.entries.read();
        let (dir, _) = Self::follow(&entries, &full);

        // Verify the path is a directory
        match entries.get(&dir) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(full)),
            None => return Err(VfsError::not_found(full)),
        }

        // Find all direct children (BTreeMap keeps them sorted)
        let mut result = Vec::new();
        for key in entries.keys() {
            if key.is_empty() || path::parent(key) != Some(dir.as_str()) {
                continue;
            }
            let (target, alias) = Self::follow(&entries, key);
            let ty = entries
                .get(&target)
                .map_or(StructuralType::NotFound, Entry::structural_type);
            if let Some(name) = path::file_name(key) {
                result.push(DirEntry::new(name, PathType { ty, alias }));
            }
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn path_type(&self, rel: &str) -> PathType {
        let Ok(full) = self.full(rel) else {
            return PathType::new(StructuralType::BadPath);
        };
        let entries = self.tree.entries.read();

        // A file anywhere along the way makes the path unusable
        let mut prefix = String::new();
        for component in full.split('/').filter(|c| !c.is_empty()) {
            if !prefix.is_empty() {
                if let Some(Entry::File { .. }) = entries.get(&prefix) {
                    return PathType::new(StructuralType::BadPath);
                }
                prefix.push('/');
            }
            prefix.push_str(component);
        }

        let (target, alias) = Self::follow(&entries, &full);
        let ty = entries
            .get(&target)
            .map_or(StructuralType::NotFound, Entry::structural_type);
        PathType { ty, alias }
    }

    fn resolve_path(&self, rel: &str) -> VfsResult<String> {
        Ok(format!("/{}", self.full(rel)?))
    }

    fn open_file_read(&self, rel: &str) -> VfsResult<Box<dyn FileOps>> {
        self.open_file(rel, false)
    }

    fn open_file_update(&self, rel: &str) -> VfsResult<Box<dyn FileOps>> {
        self.check_writable(rel)?;
        self.open_file(rel, true)
    }

    fn create_file(&self, rel: &str, mode: u32) -> VfsResult<Box<dyn FileOps>> {
        self.check_writable(rel)?;
        let full = self.full(rel)?;
        let mut entries = self.tree.entries.write();
        Self::ensure_parents(&mut entries, &full)?;
        if let Some(Entry::Directory { .. }) = entries.get(&full) {
            return Err(VfsError::is_a_directory(full));
        }
        let data = Arc::new(RwLock::new(Vec::new()));
        entries.insert(
            full,
            Entry::File {
                data: Arc::clone(&data),
                perm: mode,
                zombie: false,
            },
        );
        Ok(Box::new(MemoryFile {
            data,
            writable: true,
        }))
    }

    fn open_dir_read(&self, rel: &str) -> VfsResult<Arc<dyn DirOps>> {
        self.open_dir(rel, true)
    }

    fn open_dir_update(&self, rel: &str) -> VfsResult<Arc<dyn DirOps>> {
        self.check_writable(rel)?;
        self.open_dir(rel, false)
    }

    fn create_dir(&self, rel: &str, mode: u32) -> VfsResult<()> {
        self.check_writable(rel)?;
        self.mkdir(rel)?;
        self.set_perm(rel, mode)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.check_writable(from)?;
        let from_full = self.full(from)?;
        let to_full = self.full(to)?;
        let mut entries = self.tree.entries.write();
        Self::ensure_parents(&mut entries, &to_full)?;

        // Remove source entry
        let entry = entries
            .remove(&from_full)
            .ok_or_else(|| VfsError::not_found(from_full.clone()))?;

        // If it's a directory, we need to rename all children too
        if matches!(entry, Entry::Directory { .. }) {
            let prefix = format!("{from_full}/");
            let children: Vec<_> = entries
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for child in children {
                if let Some(child_entry) = entries.remove(&child) {
                    let new_path = format!("{to_full}/{}", &child[prefix.len()..]);
                    entries.insert(new_path, child_entry);
                }
            }
        }

        // Insert at new location (possibly overwriting)
        entries.insert(to_full, entry);
        Ok(())
    }

    fn remove(&self, rel: &str) -> VfsResult<()> {
        self.check_writable(rel)?;
        let full = self.full(rel)?;
        if full.is_empty() {
            return Err(VfsError::PermissionDenied("cannot remove root".into()));
        }
        let mut entries = self.tree.entries.write();
        match entries.get(&full) {
            Some(Entry::Directory { .. }) => {
                let prefix = format!("{full}/");
                if entries.keys().any(|k| k.starts_with(&prefix)) {
                    return Err(VfsError::directory_not_empty(full));
                }
            }
            Some(_) => {}
            None => return Err(VfsError::not_found(full)),
        }
        entries.remove(&full);
        Ok(())
    }

    fn access(&self, rel: &str) -> VfsResult<u32> {
        let full = self.full(rel)?;
        let entries = self.tree.entries.read();
        let (target, _) = Self::follow(&entries, &full);
        match entries.get(&target) {
            Some(Entry::File { perm, .. }) | Some(Entry::Directory { perm }) => Ok(*perm),
            _ => Err(VfsError::not_found(full)),
        }
    }
}

/// Open in-memory file. Shares its buffer with the tree entry.
#[derive(Debug)]
pub struct MemoryFile {
    data: Arc<RwLock<Vec<u8>>>,
    writable: bool,
}

impl MemoryFile {
    /// Standalone buffer-backed file, not attached to any tree.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data.into())),
            writable: true,
        }
    }
}

impl FileOps for MemoryFile {
    fn version(&self) -> DispatchVersion {
        DispatchVersion::CURRENT
    }

    fn capabilities(&self) -> FileCaps {
        let caps = FileCaps::READ | FileCaps::SIZE | FileCaps::RANDOM_ACCESS | FileCaps::KIND;
        if self.writable {
            caps | FileCaps::WRITE | FileCaps::SET_SIZE
        } else {
            caps
        }
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let data = self.data.read();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        let offset = usize::try_from(offset)
            .map_err(|_| VfsError::other("offset beyond addressable memory"))?;
        let mut data = self.data.write();
        // Extend if necessary
        if offset + buf.len() > data.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> VfsResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn set_size(&self, size: u64) -> VfsResult<()> {
        let size = usize::try_from(size)
            .map_err(|_| VfsError::other("size beyond addressable memory"))?;
        self.data.write().resize(size, 0);
        Ok(())
    }

    fn kind(&self) -> VfsResult<StructuralType> {
        Ok(StructuralType::File)
    }
}
