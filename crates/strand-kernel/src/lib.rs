//! # strand-kernel
//!
//! Storage core of a columnar scientific database.
//!
//! Given a directory tree on any medium, the kernel
//! - works out what kind of database object it holds ([`classify`]),
//! - opens it by expected kind, checks writability and manages lock files
//!   ([`OpenDispatcher`]),
//! - locates the physical block holding a row through a column's level-1
//!   index ([`ColumnIndexL1`]).
//!
//! All I/O goes through [`vfs`], so a table read from local disk, from a tar
//! or KAR archive, or from memory behaves the same.

pub mod archive;
pub mod classify;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod open;
pub mod vfs;

pub use archive::{ArchiveFormat, KarBuilder, open_archive};
pub use classify::{Classification, Classifier, classify, scan_signature};
pub use codec::FileOrder;
pub use config::{ArchiveConfig, IndexConfig, StoreConfig, VfsConfig};
pub use error::{Error, ErrorKind, Result};
pub use index::{ColumnIndexL1, IndexWriter};
pub use open::{LOCK_FILE, OpenDispatcher, SEALED_FILE};
pub use vfs::{
    DirOps, FileOps, LocalDir, MemoryDir, VfsError, VfsResult, VirtualDirectory, VirtualFile,
};

pub use strand_types::{BlockLocation, ContentSignature, PathType, StructuralType};
