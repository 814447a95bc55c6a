//! Crate-level error type.

use strand_types::StructuralType;
use thiserror::Error;

use crate::vfs::VfsError;

/// Coarse error taxonomy shared by every operation.
///
/// `NullArgument` has no producer in safe Rust; it is kept so the kinds line
/// up with other tooling that reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NullArgument,
    InvalidArgument,
    InvalidPath,
    NotFound,
    Corrupt,
    Unsupported,
    BadVersion,
    WrongKind,
    Locked,
    ReadOnly,
    RangeInvalid,
    Exhausted,
    Config,
    Io,
}

/// Errors from classification, index loading and open dispatch.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("unsupported version {found} (accepted {min}..={max})")]
    BadVersion { found: u32, min: u32, max: u32 },

    #[error("{path}: expected {expected}, found {found}")]
    WrongKind {
        path: String,
        expected: StructuralType,
        found: StructuralType,
    },

    #[error("locked: {0}")]
    Locked(String),

    #[error("read-only: {0}")]
    ReadOnly(String),

    #[error("range [{first}, {upper}) extends past block ending at {block_end}")]
    RangeInvalid { first: u64, upper: u64, block_end: u64 },

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

impl Error {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Where this error sits in the taxonomy. VFS errors are folded in.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidPath(_) => ErrorKind::InvalidPath,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Corrupt(_) => ErrorKind::Corrupt,
            Error::BadVersion { .. } => ErrorKind::BadVersion,
            Error::WrongKind { .. } => ErrorKind::WrongKind,
            Error::Locked(_) => ErrorKind::Locked,
            Error::ReadOnly(_) => ErrorKind::ReadOnly,
            Error::RangeInvalid { .. } => ErrorKind::RangeInvalid,
            Error::Config(_) => ErrorKind::Config,
            Error::Vfs(e) => match e {
                VfsError::NotFound(_) => ErrorKind::NotFound,
                VfsError::AlreadyExists(_) => ErrorKind::InvalidArgument,
                VfsError::PermissionDenied(_) | VfsError::AccessDenied(_) => ErrorKind::ReadOnly,
                VfsError::ReadOnly(_) => ErrorKind::ReadOnly,
                VfsError::NotADirectory(_)
                | VfsError::IsADirectory(_)
                | VfsError::PathEscapesRoot(_)
                | VfsError::InvalidPath(_) => ErrorKind::InvalidPath,
                VfsError::DirectoryNotEmpty(_) => ErrorKind::InvalidArgument,
                VfsError::Unsupported(_) => ErrorKind::Unsupported,
                VfsError::BadVersion(_) => ErrorKind::BadVersion,
                VfsError::Exhausted(_) => ErrorKind::Exhausted,
                VfsError::CorruptArchive(_) => ErrorKind::Corrupt,
                VfsError::Io(_) | VfsError::Other(_) => ErrorKind::Io,
            },
        }
    }
}

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;
