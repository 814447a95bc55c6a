//! Block location records.

use serde::{Deserialize, Serialize};

/// Binds a half-open row-id interval `[start_id, start_id + id_range)` to a
/// physical block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocation {
    /// First row id covered.
    pub start_id: u64,
    /// Number of row ids covered.
    pub id_range: u32,
    /// Physical page / offset locator.
    pub pg: u64,
    /// Generation or tag word.
    pub generation: u32,
}

impl BlockLocation {
    pub fn new(start_id: u64, id_range: u32, pg: u64, generation: u32) -> Self {
        Self {
            start_id,
            id_range,
            pg,
            generation,
        }
    }

    /// Exclusive end of the interval, `None` if it would wrap.
    pub fn end_id(&self) -> Option<u64> {
        self.start_id.checked_add(u64::from(self.id_range))
    }

    /// True when `id` falls inside the interval.
    pub fn contains(&self, id: u64) -> bool {
        id >= self.start_id && self.end_id().is_none_or(|end| id < end)
    }

    /// True when the two half-open intervals share at least one id.
    pub fn overlaps(&self, other: &BlockLocation) -> bool {
        let (Some(a_end), Some(b_end)) = (self.end_id(), other.end_id()) else {
            return true;
        };
        self.start_id < b_end && other.start_id < a_end
    }
}
