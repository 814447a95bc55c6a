//! Level-1 column index.
//!
//! Every column directory carries an `idx1` file mapping row-id intervals to
//! physical blocks. [`ColumnIndexL1::open`] decodes it, in either byte
//! order, into an interval tree answering "which block holds rows
//! `[first, upper)`".
//!
//! | Version | Header                         | Records in `idx1` |
//! |---------|--------------------------------|-------------------|
//! | 1, 2    | 40 bytes at the start of `idx1`| from byte 40      |
//! | 3+      | 48 bytes in the `idx` file     | from byte 8       |

pub mod header;
mod l1;
pub mod record;
mod writer;

pub use header::{Checksum, IndexHeader};
pub use l1::{ColumnIndexL1, IDX, IDX1};
pub use writer::{IndexFiles, IndexWriter};
