//! Feed diff phase: bring the season's calendar rows in line with the feed.

use super::{CalendarReconciler, RunReport};
use crate::audit::DiffLog;
use crate::error::Result;
use crate::model::{CalendarEntry, Meeting};
use crate::resolvers::{insert_logged, update_logged};
use crate::store::criteria::for_season;
use crate::store::{MeetingIdAllocator, Repository};
use std::collections::HashSet;

impl<'a, R: Repository, A: MeetingIdAllocator> CalendarReconciler<'a, R, A> {
    /// Delete stale rows, update changed ones and insert new ones. Returns the
    /// persisted rows in feed order.
    ///
    /// A stale row survives when its meeting already has results. Rows without
    /// a code and repeated codes are dropped from the feed.
    pub fn sync_feed(&mut self, feed: &[CalendarEntry], report: &mut RunReport) -> Result<Vec<CalendarEntry>> {
        let season_id = self.season_id()?;
        let existing: Vec<CalendarEntry> = self.store.find_many(&for_season(season_id))?;
        let feed_codes: HashSet<&str> = feed.iter().map(|e| e.meeting_code.trim()).filter(|c| !c.is_empty()).collect();

        for stale in existing.iter().filter(|e| !feed_codes.contains(e.meeting_code.trim())) {
            if self.has_acquired_results(stale)? {
                tracing::debug!(code = %stale.meeting_code, "stale calendar row kept: results acquired");
                continue;
            }
            let record = self.store.delete_with_audit(stale)?;
            report.diff.record_delete(record, format!("Calendar row deleted: {}", stale.meeting_code));
        }

        let mut seen = HashSet::new();
        let mut synced = Vec::new();
        for incoming in feed {
            let code = incoming.meeting_code.trim();
            if code.is_empty() {
                tracing::warn!(name = %incoming.name, "calendar row without meeting code dropped");
                continue;
            }
            if !seen.insert(code.to_string()) {
                tracing::warn!(code, "duplicate meeting code in feed dropped");
                continue;
            }

            let mut diff = DiffLog::new();
            let outcome = match existing.iter().find(|e| e.meeting_code.trim() == code) {
                Some(current) => self.update_row(current.clone(), incoming, &mut diff),
                None => {
                    let mut row = CalendarEntry {
                        id: None,
                        season_id,
                        meeting_code: code.to_string(),
                        meeting_id: None,
                        updated_at: None,
                        ..incoming.clone()
                    };
                    let action = format!("Calendar row created: {code}");
                    insert_logged(self.store, &mut row, self.throttle.now(), &mut diff, action).map(|_| row)
                }
            };
            report.diff.append(&diff);
            match outcome {
                Ok(row) => synced.push(row),
                Err(err) => report.push_error(code, err.to_string()),
            }
        }
        Ok(synced)
    }

    fn update_row(&mut self, current: CalendarEntry, incoming: &CalendarEntry, diff: &mut DiffLog) -> Result<CalendarEntry> {
        let mut row = current;
        let mut changes = Vec::new();
        assign_changed!(changes, row.name, incoming.name.clone());
        assign_changed!(changes, row.place, incoming.place.clone());
        assign_changed!(changes, row.dates, incoming.dates.clone());
        assign_changed!(changes, row.month, incoming.month.clone());
        assign_changed!(changes, row.year, incoming.year.clone());
        assign_changed!(changes, row.program, incoming.program.clone());
        assign_changed!(changes, row.organization, incoming.organization.clone());
        assign_changed!(changes, row.name_import, incoming.name_import.clone());
        assign_changed!(changes, row.manifest_link, incoming.manifest_link.clone());
        assign_changed!(changes, row.startlist_link, incoming.startlist_link.clone());
        assign_changed!(changes, row.results_link, incoming.results_link.clone());
        assign_changed!(changes, row.cancelled, incoming.cancelled);

        let action = format!("Calendar row updated: {} ({})", row.meeting_code, changes.join(", "));
        update_logged(self.store, &mut row, &changes, self.throttle.now(), diff, action)?;
        Ok(row)
    }

    fn has_acquired_results(&self, entry: &CalendarEntry) -> Result<bool> {
        let Some(meeting_id) = entry.meeting_id else {
            return Ok(false);
        };
        Ok(self.store.find_by_id::<Meeting>(meeting_id)?.is_some_and(|m| m.results_acquired))
    }
}
