//! Free meeting-id allocation.
//!
//! New meetings get an id from a numeric range reserved per season year and
//! federation, so rows created by different federations' imports never collide:
//!
//! ```text
//! base  = (season_year % 100) * 10_000 + federation_offset * 1_000
//! range = base + 1 ..= base + capacity
//! ```

use super::{Criteria, Repository};
use crate::model::{Meeting, Season};
use chrono::Datelike;

/// Numeric slot of a federation inside a season's reserved block.
pub fn federation_offset(federation_code: &str) -> i64 {
    match federation_code.trim().to_ascii_uppercase().as_str() {
        "FIN" => 1,
        "CSI" => 2,
        "UISP" => 3,
        "LEN" => 4,
        _ => 9,
    }
}

pub trait MeetingIdAllocator {
    /// First unused id of the reserved range, or `None` when it is exhausted.
    fn allocate<R: Repository>(&self, store: &R, season: &Season, federation_code: &str) -> Option<i64>;
}

#[derive(Debug, Clone, Copy)]
pub struct ReservedRangeAllocator {
    pub capacity: i64,
}

impl Default for ReservedRangeAllocator {
    fn default() -> Self {
        ReservedRangeAllocator { capacity: 999 }
    }
}

impl ReservedRangeAllocator {
    pub fn range(&self, season: &Season, federation_code: &str) -> std::ops::RangeInclusive<i64> {
        let year = season.begin_date.year() as i64;
        let base = (year % 100) * 10_000 + federation_offset(federation_code) * 1_000;
        (base + 1)..=(base + self.capacity)
    }
}

impl MeetingIdAllocator for ReservedRangeAllocator {
    fn allocate<R: Repository>(&self, store: &R, season: &Season, federation_code: &str) -> Option<i64> {
        self.range(season, federation_code).find(|id| match store.find_one::<Meeting>(&Criteria::new().eq("id", *id)) {
            Ok(found) => found.is_none(),
            Err(err) => {
                tracing::warn!(id, %err, "meeting id lookup failed");
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn season() -> Season {
        Season {
            id: Some(232),
            header_year: "2023/2024".into(),
            begin_date: NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            federation_code: "FIN".into(),
        }
    }

    #[test]
    fn range_depends_on_year_and_federation() {
        let alloc = ReservedRangeAllocator::default();
        assert_eq!(alloc.range(&season(), "FIN"), 231_001..=231_999);
        assert_eq!(alloc.range(&season(), "csi"), 232_001..=232_999);
    }

    #[test]
    fn allocate_skips_used_ids_and_exhausts() {
        let mut store = MemoryStore::new();
        let alloc = ReservedRangeAllocator { capacity: 2 };
        store.seed(Meeting { id: Some(231_001), ..Meeting::default() }).unwrap();
        assert_eq!(alloc.allocate(&store, &season(), "FIN"), Some(231_002));

        store.seed(Meeting { id: Some(231_002), ..Meeting::default() }).unwrap();
        assert_eq!(alloc.allocate(&store, &season(), "FIN"), None);
    }
}
