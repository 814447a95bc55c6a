//! VFS backends.
//!
//! Backends implement [`FileOps`](super::FileOps) and
//! [`DirOps`](super::DirOps) for different media. Archive members live in
//! [`crate::archive`]; encrypted and network streams are supplied by
//! collaborators implementing the same traits.

mod local;
mod memory;
mod stream;

pub use local::{LocalDir, LocalFile};
pub use memory::{MemoryDir, MemoryFile};
pub use stream::{SequentialReader, SequentialWriter, stderr, stdin, stdout};
