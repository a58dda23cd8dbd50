//! Entity resolvers.
//!
//! Each resolver owns its inputs, a memoized result and its own [`DiffLog`].
//! `resolve` is idempotent: a second call on the same instance returns the
//! cached entity without touching the repository. Resolvers are built fresh
//! for every calendar entry, so nothing is shared across entries.
//!
//! ```text
//! MeetingResolver   5-tier cascade, reserved-range id allocation
//! PoolResolver      nick-name / fuzzy / alternate type / first-in-city
//!   └─ CityResolver  text candidate / fallback place / geocoded locality
//! SessionResolver   3-tier cascade keyed on the event-code set
//! EventResolver     meeting-wide event-type uniqueness, running order
//! ```
//!
//! City and pool updates go through a [`Throttle`]: with single-update mode
//! on, a row touched less than `throttle_minutes` ago is left alone.

#[path = "resolvers/city.rs"]
mod city;
#[path = "resolvers/event.rs"]
mod event;
#[path = "resolvers/meeting.rs"]
mod meeting;
#[path = "resolvers/pool.rs"]
mod pool;
#[path = "resolvers/session.rs"]
mod session;
#[path = "resolvers/text.rs"]
pub mod text;

pub use city::{CITY_MIN_BIAS, CityResolver};
pub use event::EventResolver;
pub use meeting::{MeetingResolver, meeting_code};
pub use pool::{PoolResolver, nick_name, parse_pool_type};
pub use session::{SessionResolver, session_event_codes};

use crate::api::{Context, Options};
use crate::audit::DiffLog;
use crate::error::Result;
use crate::store::{Entity, Repository};
use chrono::{NaiveDateTime, TimeDelta};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throttle {
    single_update: bool,
    window: TimeDelta,
    now: NaiveDateTime,
}

impl Throttle {
    pub fn new(single_update: bool, minutes: u32, now: NaiveDateTime) -> Self {
        Throttle { single_update, window: TimeDelta::minutes(i64::from(minutes)), now }
    }

    pub fn from_options(options: &Options, context: &Context) -> Self {
        Self::new(options.single_update, options.throttle_minutes, context.reference_time)
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn may_update(&self, updated_at: Option<NaiveDateTime>) -> bool {
        match updated_at {
            _ if !self.single_update => true,
            None => true,
            Some(at) => self.now - at > self.window,
        }
    }
}

/// Stamp, insert and log `entity`. Failures are logged as `-- ERROR` lines and returned.
pub(crate) fn insert_logged<R: Repository, E: Entity>(
    store: &mut R,
    entity: &mut E,
    now: NaiveDateTime,
    diff: &mut DiffLog,
    action: impl Into<String>,
) -> Result<()> {
    entity.touch(now);
    match store.save(entity) {
        Ok(_) => {
            diff.record_insert(entity, action);
            Ok(())
        }
        Err(err) => {
            diff.error(err.to_string());
            Err(err.into())
        }
    }
}

/// Stamp, save and log an update of `columns`. Does nothing when `columns` is empty.
pub(crate) fn update_logged<R: Repository, E: Entity>(
    store: &mut R,
    entity: &mut E,
    columns: &[&'static str],
    now: NaiveDateTime,
    diff: &mut DiffLog,
    action: impl Into<String>,
) -> Result<bool> {
    if columns.is_empty() {
        return Ok(false);
    }
    entity.touch(now);
    match store.save(entity) {
        Ok(_) => {
            diff.record_update(entity, columns, action);
            Ok(true)
        }
        Err(err) => {
            diff.error(err.to_string());
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn throttle_window() {
        let throttle = Throttle::new(true, 30, now());
        assert!(throttle.may_update(None));
        assert!(!throttle.may_update(Some(now() - TimeDelta::minutes(10))));
        assert!(throttle.may_update(Some(now() - TimeDelta::minutes(40))));
        assert!(Throttle::new(false, 30, now()).may_update(Some(now())));
    }
}
