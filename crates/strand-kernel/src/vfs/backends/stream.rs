//! Sequential-only file backends over `Read`/`Write` streams.
//!
//! Positions only move forward. A read at the current position is serviced;
//! a read ahead of it skips the gap; a read behind it is refused.

use std::io::{self, Read, Write};

use parking_lot::Mutex;
use strand_types::StructuralType;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::FileOps;
use crate::vfs::types::{BackendKind, DispatchVersion, FileCaps};

struct Cursor<T> {
    stream: T,
    pos: u64,
}

/// Read side of a stream, such as stdin or a pipe.
pub struct SequentialReader<R> {
    inner: Mutex<Cursor<R>>,
}

impl<R: Read + Send> SequentialReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            inner: Mutex::new(Cursor { stream, pos: 0 }),
        }
    }

    /// Current stream position.
    pub fn position(&self) -> u64 {
        self.inner.lock().pos
    }
}

impl<R: Read + Send> FileOps for SequentialReader<R> {
    fn version(&self) -> DispatchVersion {
        DispatchVersion::CURRENT
    }

    fn capabilities(&self) -> FileCaps {
        FileCaps::READ | FileCaps::KIND
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Stream
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let mut cursor = self.inner.lock();
        if offset < cursor.pos {
            return Err(VfsError::other(format!(
                "stream at {} cannot seek back to {offset}",
                cursor.pos
            )));
        }
        let gap = offset - cursor.pos;
        if gap > 0 {
            let skipped = io::copy(&mut (&mut cursor.stream).take(gap), &mut io::sink())?;
            cursor.pos += skipped;
            if skipped < gap {
                return Ok(0);
            }
        }
        let n = loop {
            match cursor.stream.read(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        cursor.pos += n as u64;
        Ok(n)
    }

    fn random_access(&self) -> bool {
        false
    }

    fn kind(&self) -> VfsResult<StructuralType> {
        Ok(StructuralType::Fifo)
    }
}

/// Write side of a stream, such as stdout.
pub struct SequentialWriter<W> {
    inner: Mutex<Cursor<W>>,
}

impl<W: Write + Send> SequentialWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            inner: Mutex::new(Cursor { stream, pos: 0 }),
        }
    }

    /// Give back the wrapped stream.
    pub fn into_inner(self) -> W {
        self.inner.into_inner().stream
    }
}

impl<W: Write + Send> FileOps for SequentialWriter<W> {
    fn version(&self) -> DispatchVersion {
        DispatchVersion::CURRENT
    }

    fn capabilities(&self) -> FileCaps {
        FileCaps::WRITE | FileCaps::KIND
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Stream
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        let mut cursor = self.inner.lock();
        if offset != cursor.pos {
            return Err(VfsError::other(format!(
                "stream at {} cannot write at {offset}",
                cursor.pos
            )));
        }
        let n = cursor.stream.write(buf)?;
        cursor.pos += n as u64;
        Ok(n)
    }

    fn random_access(&self) -> bool {
        false
    }

    fn kind(&self) -> VfsResult<StructuralType> {
        Ok(StructuralType::Fifo)
    }

    fn close(&self) -> VfsResult<()> {
        self.inner.lock().stream.flush()?;
        Ok(())
    }
}

pub fn stdin() -> SequentialReader<io::Stdin> {
    SequentialReader::new(io::stdin())
}

pub fn stdout() -> SequentialWriter<io::Stdout> {
    SequentialWriter::new(io::stdout())
}

pub fn stderr() -> SequentialWriter<io::Stderr> {
    SequentialWriter::new(io::stderr())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_reads_and_skips() {
        let reader = SequentialReader::new(io::Cursor::new(b"0123456789".to_vec()));
        let mut buf = [0u8; 3];

        assert_eq!(reader.read_at(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"012");

        // Skip ahead over 3..5
        assert_eq!(reader.read_at(5, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"567");
        assert_eq!(reader.position(), 8);

        assert!(reader.read_at(0, &mut buf).is_err());
        assert_eq!(reader.read_at(100, &mut buf).unwrap(), 0);
        assert!(!reader.random_access());
    }

    #[test]
    fn test_writer_is_append_only() {
        let writer = SequentialWriter::new(Vec::new());
        assert_eq!(writer.write_at(0, b"abc").unwrap(), 3);
        assert!(writer.write_at(0, b"x").is_err());
        assert_eq!(writer.write_at(3, b"de").unwrap(), 2);
        writer.close().unwrap();
        assert_eq!(writer.into_inner(), b"abcde");
    }
}
