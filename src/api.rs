use crate::error::{Error, Result};
use crate::geocode::Geocoder;
use crate::model::{CalendarEntry, PoolType, Season};
use crate::parser::{self, SessionDraft};
use crate::reconciler::{CalendarReconciler, RunReport};
use crate::store::Repository;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::Path;

/// Reconciliation context.
///
/// Holds the "now" used for update throttling and `updated_at` stamps.
#[derive(Debug, Clone)]
pub struct Context {
    /// Reference datetime for throttle windows and row timestamps.
    pub reference_time: NaiveDateTime,
}

impl Default for Context {
    fn default() -> Self {
        if cfg!(test) {
            let reference_time =
                NaiveDate::from_ymd_opt(2024, 1, 15).and_then(|d| d.and_hms_opt(12, 0, 0)).unwrap_or_default();
            Self { reference_time }
        } else {
            Self { reference_time: Local::now().naive_local() }
        }
    }
}

/// Options that affect resolution and update behavior.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// force_geocode = true
/// throttle_minutes = 60
/// federation_code = "CSI"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Geocode every city and pool, even when a text match was found.
    pub force_geocode: bool,
    /// Leave rows touched within `throttle_minutes` alone.
    pub single_update: bool,
    pub throttle_minutes: u32,
    /// Re-process meetings whose results are already acquired.
    pub force_reprocess: bool,
    pub create_missing_event_types: bool,
    /// `"25"` or `"50"`; used when the pool text does not say.
    pub default_pool_type: String,
    pub federation_code: String,
    pub geocoding_api_key: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            force_geocode: false,
            single_update: true,
            throttle_minutes: 30,
            force_reprocess: false,
            create_missing_event_types: true,
            default_pool_type: PoolType::Metres25.code().to_string(),
            federation_code: "FIN".to_string(),
            geocoding_api_key: None,
        }
    }
}

impl Options {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Options = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        if PoolType::from_code(&options.default_pool_type).is_none() {
            return Err(Error::Config(format!("default_pool_type must be 25 or 50, got '{}'", options.default_pool_type)));
        }
        Ok(options)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn pool_type(&self) -> PoolType {
        PoolType::from_code(&self.default_pool_type).unwrap_or_default()
    }
}

/// Group a program text into session drafts.
///
/// # Example
/// ```
/// let drafts = fincal::extract_sessions("Sabato 24 febbraio ore 15.00\n400 SL, 100 dorso");
/// assert_eq!(drafts.len(), 1);
/// assert_eq!(drafts[0].event_codes(), vec!["400SL", "100DO"]);
/// ```
pub fn extract_sessions(program: &str) -> Vec<SessionDraft> {
    parser::extract_sessions(program)
}

/// Program lines that carry dates, times, events or warm-ups.
pub fn filter_program_lines(program: &str) -> Vec<String> {
    parser::filter_program_lines(program)
}

/// Run a full reconciliation of `feed` for `season`: feed sync, per-entry
/// resolution, then cleanup.
pub fn reconcile<R: Repository>(
    store: &mut R,
    geocoder: &dyn Geocoder,
    season: &Season,
    feed: &[CalendarEntry],
    context: &Context,
    options: &Options,
) -> RunReport {
    CalendarReconciler::new(store, geocoder, season, context, options).run(feed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_partial_toml() {
        let options = Options::from_toml_str("force_geocode = true\nthrottle_minutes = 60\n").unwrap();
        assert!(options.force_geocode);
        assert_eq!(options.throttle_minutes, 60);
        assert!(options.single_update);
        assert_eq!(options.federation_code, "FIN");
        assert_eq!(options.pool_type(), PoolType::Metres25);
    }

    #[test]
    fn options_reject_bad_values() {
        assert!(matches!(Options::from_toml_str("default_pool_type = \"33\""), Err(Error::Config(_))));
        assert!(matches!(Options::from_toml_str("throttle_minutes = \"soon\""), Err(Error::Config(_))));
    }

    #[test]
    fn context_is_fixed_under_test() {
        assert_eq!(Context::default().reference_time.to_string(), "2024-01-15 12:00:00");
    }
}
