//! Byte-order tagged binary fields.
//!
//! Index and KAR files open with the same 32-bit tag. Reading it
//! little-endian yields [`ENDIAN_TAG`] for a little-endian file and its byte
//! swap for a big-endian one; every later field is decoded in that order.

use std::io::{self, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

/// Byte-order sentinel at the start of tagged files.
pub const ENDIAN_TAG: u32 = 0x0503_1988;

/// Byte order of a tagged file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileOrder {
    Little,
    Big,
}

impl FileOrder {
    /// Order of the running host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            FileOrder::Big
        } else {
            FileOrder::Little
        }
    }

    /// Detect the order from the first four bytes of a file.
    pub fn detect(tag: [u8; 4]) -> Option<Self> {
        let raw = u32::from_le_bytes(tag);
        if raw == ENDIAN_TAG {
            Some(FileOrder::Little)
        } else if raw == ENDIAN_TAG.swap_bytes() {
            Some(FileOrder::Big)
        } else {
            None
        }
    }

    /// True when fields need swapping on this host.
    pub fn is_swapped(self) -> bool {
        self != Self::native()
    }
}

/// Sequential field decoder over a byte slice.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    order: FileOrder,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8], order: FileOrder) -> Self {
        Self { buf, order }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn u8(&mut self) -> io::Result<u8> {
        self.buf.read_u8()
    }

    pub fn u16(&mut self) -> io::Result<u16> {
        match self.order {
            FileOrder::Little => self.buf.read_u16::<LittleEndian>(),
            FileOrder::Big => self.buf.read_u16::<BigEndian>(),
        }
    }

    pub fn u32(&mut self) -> io::Result<u32> {
        match self.order {
            FileOrder::Little => self.buf.read_u32::<LittleEndian>(),
            FileOrder::Big => self.buf.read_u32::<BigEndian>(),
        }
    }

    pub fn u64(&mut self) -> io::Result<u64> {
        match self.order {
            FileOrder::Little => self.buf.read_u64::<LittleEndian>(),
            FileOrder::Big => self.buf.read_u64::<BigEndian>(),
        }
    }

    /// Borrow the next `len` bytes.
    pub fn bytes(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }
}

/// Field encoder appending to a buffer.
pub struct FieldWriter {
    buf: Vec<u8>,
    order: FileOrder,
}

impl FieldWriter {
    pub fn new(order: FileOrder) -> Self {
        Self {
            buf: Vec::new(),
            order,
        }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        // Writes into a Vec cannot fail
        let _ = self.buf.write_u8(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        let _ = match self.order {
            FileOrder::Little => self.buf.write_u16::<LittleEndian>(v),
            FileOrder::Big => self.buf.write_u16::<BigEndian>(v),
        };
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        let _ = match self.order {
            FileOrder::Little => self.buf.write_u32::<LittleEndian>(v),
            FileOrder::Big => self.buf.write_u32::<BigEndian>(v),
        };
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        let _ = match self.order {
            FileOrder::Little => self.buf.write_u64::<LittleEndian>(v),
            FileOrder::Big => self.buf.write_u64::<BigEndian>(v),
        };
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        let _ = self.buf.write_all(v);
        self
    }

    pub fn zeros(&mut self, len: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + len, 0);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_order() {
        assert_eq!(FileOrder::detect([0x88, 0x19, 0x03, 0x05]), Some(FileOrder::Little));
        assert_eq!(FileOrder::detect([0x05, 0x03, 0x19, 0x88]), Some(FileOrder::Big));
        assert_eq!(FileOrder::detect(*b"NCBI"), None);
    }

    #[test]
    fn test_fields_follow_order() {
        for order in [FileOrder::Little, FileOrder::Big] {
            let mut w = FieldWriter::new(order);
            w.u32(ENDIAN_TAG).u16(7).u64(1 << 40).u8(9);
            let bytes = w.into_inner();
            assert_eq!(bytes.len(), 15);

            let tag: [u8; 4] = bytes[..4].try_into().unwrap();
            assert_eq!(FileOrder::detect(tag), Some(order));

            let mut r = FieldReader::new(&bytes, order);
            assert_eq!(r.u32().unwrap(), ENDIAN_TAG);
            assert_eq!(r.u16().unwrap(), 7);
            assert_eq!(r.u64().unwrap(), 1 << 40);
            assert_eq!(r.u8().unwrap(), 9);
            assert!(r.u8().is_err());
        }
    }

    #[test]
    fn test_big_endian_layout() {
        let mut w = FieldWriter::new(FileOrder::Big);
        w.u32(1);
        assert_eq!(w.into_inner(), vec![0, 0, 0, 1]);
    }
}
