//! Virtual I/O abstraction.
//!
//! Every byte the engine touches goes through this module. Key components:
//!
//! - [`FileOps`] / [`DirOps`] - backend traits, with optional operations
//!   defaulting to [`VfsError::Unsupported`]
//! - [`VirtualFile`] / [`VirtualDirectory`] - reference-counted handles that
//!   validate a backend's dispatch version and capabilities once, at
//!   construction
//! - [`backends`] - local disk, in-memory, and sequential streams
//!
//! Archive members are served by [`crate::archive`] through the same traits.
//!
//! ## Design Decisions
//!
//! - **Declared capabilities**: a backend states its version and the
//!   operations it implements. Calls beyond that set fail uniformly before
//!   reaching the backend.
//! - **Path-based directories**: sub-objects are addressed by `/`-separated
//!   paths relative to the directory handle.
//! - **Owner teardown**: a directory that hands out files can claim their
//!   teardown through [`DirOps::release_file`]. Files hold it weakly.

pub mod backends;
mod error;
mod handle;
mod ops;
pub mod path;
mod types;

pub use backends::{LocalDir, LocalFile, MemoryDir, MemoryFile};
pub use error::{VfsError, VfsResult};
pub use handle::{DEFAULT_MAX_REFS, VirtualDirectory, VirtualFile};
pub use ops::{DirOps, FileOps};
pub use types::{BackendKind, DirCaps, DirEntry, DispatchVersion, FileCaps};
