//! Core VFS types: dispatch versions, capability sets, directory entries.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strand_types::PathType;

/// Version of the operation set a backend implements.
///
/// Minor versions only ever add optional operations, so a backend declaring
/// `1.0` keeps working against an engine at `1.1`; it simply answers
/// `Unsupported` for the newer operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DispatchVersion {
    pub major: u16,
    pub minor: u16,
}

impl DispatchVersion {
    /// Base operation set.
    pub const V1_0: Self = Self::new(1, 0);
    /// Adds file `kind` and directory `access`.
    pub const V1_1: Self = Self::new(1, 1);
    /// Newest version this engine understands.
    pub const CURRENT: Self = Self::V1_1;

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// True when the engine can drive a backend declaring this version.
    pub fn is_supported(self) -> bool {
        self.major == Self::CURRENT.major && self.minor <= Self::CURRENT.minor
    }

    /// True when operations introduced at `minor` are available.
    pub fn has_minor(self, minor: u16) -> bool {
        self.minor >= minor
    }
}

impl fmt::Display for DispatchVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

bitflags! {
    /// Operations a file backend implements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FileCaps: u32 {
        const READ          = 1 << 0;
        const WRITE         = 1 << 1;
        const SIZE          = 1 << 2;
        const SET_SIZE      = 1 << 3;
        const RANDOM_ACCESS = 1 << 4;
        const KIND          = 1 << 5;
        const TIMED_READ    = 1 << 6;
    }
}

impl FileCaps {
    /// Capabilities a backend must declare at the given minor version.
    ///
    /// Byte I/O itself is checked separately: a file must read or write.
    pub fn mandatory(minor: u16) -> FileCaps {
        if minor >= 1 {
            FileCaps::KIND
        } else {
            FileCaps::empty()
        }
    }
}

bitflags! {
    /// Operations a directory backend implements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DirCaps: u32 {
        const LIST      = 1 << 0;
        const PATH_TYPE = 1 << 1;
        const RESOLVE   = 1 << 2;
        const OPEN_FILE = 1 << 3;
        const OPEN_DIR  = 1 << 4;
        const CREATE    = 1 << 5;
        const RENAME    = 1 << 6;
        const REMOVE    = 1 << 7;
        const ACCESS    = 1 << 8;
    }
}

impl DirCaps {
    /// Capabilities a backend must declare at the given minor version.
    pub fn mandatory(minor: u16) -> DirCaps {
        let base = DirCaps::LIST | DirCaps::PATH_TYPE | DirCaps::OPEN_FILE | DirCaps::OPEN_DIR;
        if minor >= 1 { base | DirCaps::ACCESS } else { base }
    }
}

/// Which backend family produced a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Memory,
    ArchiveMember,
    Stream,
    /// Supplied by a collaborator (encrypted, network, ...).
    External,
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Raw structural type as reported by the medium.
    pub kind: PathType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: impl Into<PathType>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}
