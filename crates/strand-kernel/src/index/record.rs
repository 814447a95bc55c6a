//! Block location records: `start_id: u64, pg: u64, generation: u32,
//! id_range: u32`, 24 bytes in the file's byte order.

use strand_types::BlockLocation;

use crate::codec::{FieldReader, FieldWriter, FileOrder};
use crate::error::{Error, Result};

pub const RECORD_SIZE: usize = 24;

/// Decode one record from exactly [`RECORD_SIZE`] bytes.
pub fn decode(buf: &[u8], order: FileOrder) -> Result<BlockLocation> {
    let mut r = FieldReader::new(buf, order);
    let short = |e: std::io::Error| Error::corrupt(format!("block record: {e}"));
    let start_id = r.u64().map_err(short)?;
    let pg = r.u64().map_err(short)?;
    let generation = r.u32().map_err(short)?;
    let id_range = r.u32().map_err(short)?;
    Ok(BlockLocation::new(start_id, id_range, pg, generation))
}

pub fn encode(w: &mut FieldWriter, loc: &BlockLocation) {
    w.u64(loc.start_id)
        .u64(loc.pg)
        .u32(loc.generation)
        .u32(loc.id_range);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_on_disk() {
        let mut w = FieldWriter::new(FileOrder::Little);
        encode(&mut w, &BlockLocation::new(1, 4, 2, 3));
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[8], 2);
        assert_eq!(bytes[16], 3);
        assert_eq!(bytes[20], 4);
    }

    #[test]
    fn test_short_record() {
        assert!(matches!(decode(&[0u8; 20], FileOrder::Big), Err(Error::Corrupt(_))));
    }
}
