//! Calendar reconciliation orchestrator.
//!
//! One run over a season's feed:
//!
//! ```text
//! sync_feed ──▶ for each calendar row:
//!                 Skip(incomplete)
//!                 MeetingResolved ──▶ results acquired? ──▶ link row, done
//!                 [PoolResolved ─▶ SessionResolved ─▶ EventsResolved]*   (one per draft)
//!                 CalendarEntryLinked
//!           ──▶ cleanup (unlinked meetings, empty sessions)
//! ```
//!
//! Failures inside one row (or one draft) are logged and tallied; they never
//! abort the run. There is no rollback: partial progress stays persisted.

#[path = "reconciler/cleanup.rs"]
mod cleanup;
#[path = "reconciler/feed.rs"]
mod feed;
#[cfg(test)]
#[path = "reconciler/tests.rs"]
mod tests;

use crate::api::{Context, Options};
use crate::audit::DiffLog;
use crate::error::{Error, Result};
use crate::geocode::Geocoder;
use crate::model::{CalendarEntry, Meeting, Season};
use crate::parser::{SessionDraft, extract_sessions};
use crate::resolvers::{EventResolver, MeetingResolver, PoolResolver, SessionResolver, Throttle, update_logged};
use crate::store::{MeetingIdAllocator, Repository, ReservedRangeAllocator};
use std::time::{Duration, Instant};

/// A calendar row that failed, for manual follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryError {
    pub meeting_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Skipped { reason: &'static str },
    /// Meeting already has results; sessions and events were left alone.
    ResultsAcquired { meeting_id: i64 },
    Synced { meeting_id: i64, sessions: usize, events: usize },
}

/// What processing one calendar row produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryReport {
    pub outcome: EntryOutcome,
    pub diff: DiffLog,
    /// Draft-level failures; the row itself was still processed.
    pub errors: Vec<String>,
}

impl EntryReport {
    fn skipped(reason: &'static str) -> Self {
        EntryReport { outcome: EntryOutcome::Skipped { reason }, diff: DiffLog::new(), errors: Vec::new() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub processed: usize,
    pub skipped: usize,
    pub errors: Vec<EntryError>,
    pub diff: DiffLog,
    pub elapsed: Duration,
}

impl RunReport {
    fn push_error(&mut self, meeting_code: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(meeting_code, %message, "calendar entry failed");
        self.errors.push(EntryError { meeting_code: meeting_code.to_string(), message });
    }
}

pub struct CalendarReconciler<'a, R: Repository, A: MeetingIdAllocator = ReservedRangeAllocator> {
    store: &'a mut R,
    geocoder: &'a dyn Geocoder,
    allocator: A,
    season: Season,
    options: Options,
    throttle: Throttle,
}

impl<'a, R: Repository> CalendarReconciler<'a, R> {
    pub fn new(
        store: &'a mut R,
        geocoder: &'a dyn Geocoder,
        season: &Season,
        context: &Context,
        options: &Options,
    ) -> Self {
        CalendarReconciler {
            store,
            geocoder,
            allocator: ReservedRangeAllocator::default(),
            season: season.clone(),
            options: options.clone(),
            throttle: Throttle::from_options(options, context),
        }
    }
}

impl<'a, R: Repository, A: MeetingIdAllocator> CalendarReconciler<'a, R, A> {
    pub fn with_allocator<B: MeetingIdAllocator>(self, allocator: B) -> CalendarReconciler<'a, R, B> {
        CalendarReconciler {
            store: self.store,
            geocoder: self.geocoder,
            allocator,
            season: self.season,
            options: self.options,
            throttle: self.throttle,
        }
    }

    fn season_id(&self) -> Result<i64> {
        self.season.id.ok_or_else(|| Error::Precondition("season must be persisted".into()))
    }

    /// Feed sync, every row, then cleanup.
    pub fn run(&mut self, feed: &[CalendarEntry]) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::default();

        let entries = match self.sync_feed(feed, &mut report) {
            Ok(entries) => entries,
            Err(err) => {
                report.diff.error(err.to_string());
                report.push_error("", err.to_string());
                report.elapsed = started.elapsed();
                return report;
            }
        };
        report.skipped += feed.len().saturating_sub(entries.len());

        for mut entry in entries {
            match self.process_entry(&mut entry) {
                Ok(EntryReport { outcome: EntryOutcome::Skipped { reason }, .. }) => {
                    tracing::debug!(code = %entry.meeting_code, reason, "calendar entry skipped");
                    report.skipped += 1;
                }
                Ok(entry_report) => {
                    report.processed += 1;
                    for message in &entry_report.errors {
                        report.push_error(&entry.meeting_code, message.clone());
                    }
                    if entry_report.diff.has_changes() || !entry_report.errors.is_empty() {
                        report.diff.append(&entry_report.diff);
                    }
                }
                Err(err) => {
                    report.diff.error(format!("{}: {err}", entry.meeting_code));
                    report.push_error(&entry.meeting_code, err.to_string());
                }
            }
        }

        match self.cleanup() {
            Ok(diff) => report.diff.append(&diff),
            Err(err) => {
                report.diff.error(format!("cleanup: {err}"));
                report.push_error("", format!("cleanup: {err}"));
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            processed = report.processed,
            skipped = report.skipped,
            errors = report.errors.len(),
            changes = report.diff.change_count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "reconciliation finished"
        );
        report
    }

    /// Resolve one calendar row into meeting, pools, sessions and events, then
    /// link the row to its meeting.
    pub fn process_entry(&mut self, entry: &mut CalendarEntry) -> Result<EntryReport> {
        if entry.program.trim().is_empty() || entry.meeting_code.trim().is_empty() || entry.name.trim().is_empty() {
            return Ok(EntryReport::skipped("incomplete entry"));
        }

        let mut diff = DiffLog::new();
        let mut meetings =
            MeetingResolver::new(entry, &self.season, &self.options.federation_code, &self.allocator, self.throttle);
        let meeting = meetings.resolve(self.store);
        diff.append(&meetings.diff);
        let Some(meeting) = meeting? else {
            return Ok(EntryReport::skipped("no meeting"));
        };
        let Some(meeting_id) = meeting.id else {
            return Err(Error::Precondition("resolved meeting has no id".into()));
        };

        if meeting.results_acquired && !self.options.force_reprocess {
            self.link(entry, meeting_id, &mut diff)?;
            tracing::debug!(meeting_id, "results acquired, sessions left untouched");
            return Ok(EntryReport { outcome: EntryOutcome::ResultsAcquired { meeting_id }, diff, errors: Vec::new() });
        }

        let mut default_pool = PoolResolver::new(
            &entry.place,
            &entry.place,
            self.options.pool_type(),
            self.options.force_geocode,
            self.geocoder,
            self.throttle,
        );
        let mut errors = Vec::new();
        let mut running_order = 0;
        let (mut sessions, mut events) = (0, 0);
        for mut draft in extract_sessions(&entry.program) {
            match self.process_draft(&mut draft, &meeting, entry, &mut default_pool, running_order, &mut diff) {
                Ok(next_order) => {
                    running_order = next_order;
                    sessions += 1;
                    events += draft.meeting_events.len();
                }
                Err(err) => {
                    let message = format!("session #{}: {err}", draft.session_order);
                    diff.error(&message);
                    errors.push(message);
                }
            }
        }

        self.link(entry, meeting_id, &mut diff)?;
        tracing::debug!(meeting_id, sessions, events, changed = diff.has_changes(), "calendar entry synced");
        Ok(EntryReport { outcome: EntryOutcome::Synced { meeting_id, sessions, events }, diff, errors })
    }

    fn process_draft(
        &mut self,
        draft: &mut SessionDraft,
        meeting: &Meeting,
        entry: &CalendarEntry,
        default_pool: &mut PoolResolver<'_>,
        running_order: i64,
        diff: &mut DiffLog,
    ) -> Result<i64> {
        let pool = match &draft.pool_override {
            Some(text) => {
                let mut resolver = PoolResolver::new(
                    text,
                    &entry.place,
                    self.options.pool_type(),
                    self.options.force_geocode,
                    self.geocoder,
                    self.throttle,
                );
                let pool = resolver.resolve(self.store);
                diff.append(&resolver.diff);
                pool?
            }
            None => {
                let pool = default_pool.resolve(self.store);
                diff.append(&std::mem::take(&mut default_pool.diff));
                pool?
            }
        };

        let mut sessions = SessionResolver::new(draft, meeting, pool.and_then(|p| p.id), self.throttle);
        let session = sessions.resolve(self.store);
        diff.append(&sessions.diff);
        let session = session?;

        let mut events =
            EventResolver::new(draft.event_types(), &session, self.options.create_missing_event_types, self.throttle);
        let resolved = events.resolve(self.store, running_order);
        diff.append(&events.diff);
        let (meeting_events, next_order) = resolved?;
        draft.meeting_events = meeting_events;
        Ok(next_order)
    }

    fn link(&mut self, entry: &mut CalendarEntry, meeting_id: i64, diff: &mut DiffLog) -> Result<()> {
        if entry.meeting_id == Some(meeting_id) {
            return Ok(());
        }
        entry.meeting_id = Some(meeting_id);
        let action = format!("Calendar row linked: {} -> meeting {meeting_id}", entry.meeting_code);
        update_logged(self.store, entry, &["meeting_id"], self.throttle.now(), diff, action)?;
        Ok(())
    }
}
