//! Season cleanup, run once after every calendar row was processed.

use super::CalendarReconciler;
use crate::audit::DiffLog;
use crate::error::Result;
use crate::model::{CalendarEntry, Meeting, MeetingEvent, MeetingSession};
use crate::store::criteria::{for_meeting, for_season, for_session};
use crate::store::{MeetingIdAllocator, Repository};
use std::collections::HashSet;

impl<'a, R: Repository, A: MeetingIdAllocator> CalendarReconciler<'a, R, A> {
    /// Delete meetings no calendar row links to (unless they have results or
    /// are cancelled), then sessions left without events.
    pub fn cleanup(&mut self) -> Result<DiffLog> {
        let season_id = self.season_id()?;
        let mut diff = DiffLog::new();

        let linked: HashSet<i64> = self
            .store
            .find_many::<CalendarEntry>(&for_season(season_id))?
            .into_iter()
            .filter_map(|e| e.meeting_id)
            .collect();

        for meeting in self.store.find_many::<Meeting>(&for_season(season_id))? {
            let Some(meeting_id) = meeting.id else { continue };
            if meeting.results_acquired {
                continue;
            }
            if !linked.contains(&meeting_id) && !meeting.cancelled {
                self.delete_meeting(&meeting, &mut diff)?;
                continue;
            }
            for session in self.store.find_many::<MeetingSession>(&for_meeting(meeting_id))? {
                let Some(session_id) = session.id else { continue };
                if self.store.find_one::<MeetingEvent>(&for_session(session_id))?.is_none() {
                    let record = self.store.delete_with_audit(&session)?;
                    let action = format!("Empty session deleted: meeting {meeting_id} #{}", session.session_order);
                    diff.record_delete(record, action);
                }
            }
        }

        if diff.has_changes() {
            tracing::info!(season_id, deletions = diff.change_count(), "season cleaned up");
        }
        Ok(diff)
    }

    fn delete_meeting(&mut self, meeting: &Meeting, diff: &mut DiffLog) -> Result<()> {
        let Some(meeting_id) = meeting.id else {
            return Ok(());
        };
        for session in self.store.find_many::<MeetingSession>(&for_meeting(meeting_id))? {
            let Some(session_id) = session.id else { continue };
            for event in self.store.find_many::<MeetingEvent>(&for_session(session_id))? {
                let record = self.store.delete_with_audit(&event)?;
                diff.record_delete(record, format!("Event deleted with meeting {meeting_id}"));
            }
            let record = self.store.delete_with_audit(&session)?;
            diff.record_delete(record, format!("Session deleted with meeting {meeting_id}"));
        }
        let record = self.store.delete_with_audit(meeting)?;
        diff.record_delete(record, format!("Unlinked meeting deleted: {} ({})", meeting.description, meeting.code));
        tracing::info!(meeting_id, code = %meeting.code, "unlinked meeting deleted");
        Ok(())
    }
}
