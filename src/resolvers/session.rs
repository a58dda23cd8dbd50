//! Session resolution. A session's identity is the set of event-type codes
//! attached to it, compared order-independently.

use super::{Throttle, insert_logged, update_logged};
use crate::audit::DiffLog;
use crate::error::{Error, Result};
use crate::model::{EventType, Meeting, MeetingEvent, MeetingSession};
use crate::parser::SessionDraft;
use crate::store::criteria::{for_meeting, for_session};
use crate::store::{Criteria, Repository, RepositoryResult, Value};
use std::collections::BTreeSet;

/// Event-type codes currently attached to a session.
pub fn session_event_codes<R: Repository>(store: &R, session_id: i64) -> RepositoryResult<BTreeSet<String>> {
    let mut codes = BTreeSet::new();
    for event in store.find_many::<MeetingEvent>(&for_session(session_id))? {
        if let Some(event_type) = store.find_by_id::<EventType>(event.event_type_id)? {
            codes.insert(event_type.code);
        }
    }
    Ok(codes)
}

pub struct SessionResolver {
    draft: SessionDraft,
    meeting: Meeting,
    swimming_pool_id: Option<i64>,
    throttle: Throttle,
    result: Option<MeetingSession>,
    pub diff: DiffLog,
}

impl SessionResolver {
    pub fn new(draft: &SessionDraft, meeting: &Meeting, swimming_pool_id: Option<i64>, throttle: Throttle) -> Self {
        SessionResolver {
            draft: draft.clone(),
            meeting: meeting.clone(),
            swimming_pool_id,
            throttle,
            result: None,
            diff: DiffLog::new(),
        }
    }

    pub fn resolve<R: Repository>(&mut self, store: &mut R) -> Result<MeetingSession> {
        if let Some(session) = &self.result {
            return Ok(session.clone());
        }
        let Some(meeting_id) = self.meeting.id else {
            return Err(Error::Precondition("meeting must be persisted before resolving sessions".into()));
        };

        let desired = self.desired(meeting_id);
        let session = match self.search(store, &desired)? {
            Some(found) => self.update(store, found, &desired)?,
            None => {
                let mut session = desired;
                let action = format!(
                    "Session created: #{} {} {}",
                    session.session_order,
                    session.scheduled_date,
                    self.draft.event_codes().join(", ")
                );
                insert_logged(store, &mut session, self.throttle.now(), &mut self.diff, action)?;
                tracing::info!(meeting_id, order = session.session_order, "session created");
                session
            }
        };
        self.result = Some(session.clone());
        Ok(session)
    }

    fn desired(&self, meeting_id: i64) -> MeetingSession {
        MeetingSession {
            id: None,
            meeting_id,
            session_order: self.draft.session_order,
            scheduled_date: self.draft.scheduled_date(self.meeting.header_date).unwrap_or(self.meeting.header_date),
            begin_time: self.draft.begin_time(),
            warm_up_time: self.draft.warm_up(),
            swimming_pool_id: self.swimming_pool_id,
            day_part: self.draft.day_part(),
            description: format!("Sessione {}", self.draft.session_order),
            updated_at: None,
        }
    }

    fn search<R: Repository>(&self, store: &R, desired: &MeetingSession) -> Result<Option<MeetingSession>> {
        let expected: BTreeSet<String> = self.draft.event_codes().into_iter().collect();
        let day_part = desired.day_part.map(|p| p.code());
        let same_day = for_meeting(desired.meeting_id)
            .eq("scheduled_date", desired.scheduled_date)
            .eq("day_part", Value::from(day_part));

        let tiers: [(&str, Criteria, bool); 3] = [
            ("date+time+day part", same_day.clone().eq("begin_time", Value::from(desired.begin_time)), true),
            ("date+day part", same_day, true),
            ("event set", for_meeting(desired.meeting_id), false),
        ];
        for (tier, criteria, accept_empty) in tiers {
            for candidate in store.find_many::<MeetingSession>(&criteria)? {
                let Some(id) = candidate.id else { continue };
                let codes = session_event_codes(store, id)?;
                if codes == expected || (accept_empty && codes.is_empty()) {
                    tracing::debug!(tier, id, "session matched");
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    fn update<R: Repository>(
        &mut self,
        store: &mut R,
        found: MeetingSession,
        desired: &MeetingSession,
    ) -> Result<MeetingSession> {
        let mut session = found;
        let mut changes = Vec::new();
        assign_changed!(changes, session.scheduled_date, desired.scheduled_date);
        if desired.begin_time.is_some() {
            assign_changed!(changes, session.begin_time, desired.begin_time);
        }
        if desired.warm_up_time.is_some() {
            assign_changed!(changes, session.warm_up_time, desired.warm_up_time);
        }
        if desired.swimming_pool_id.is_some() {
            assign_changed!(changes, session.swimming_pool_id, desired.swimming_pool_id);
        }
        if desired.day_part.is_some() {
            assign_changed!(changes, session.day_part, desired.day_part);
        }
        if !desired.description.is_empty() {
            assign_changed!(changes, session.description, desired.description.clone());
        }

        let action = format!("Session updated: #{} ({})", session.session_order, changes.join(", "));
        if update_logged(store, &mut session, &changes, self.throttle.now(), &mut self.diff, action)? {
            tracing::info!(id = session.id, ?changes, "session updated");
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DayPart;
    use crate::parser::extract_sessions;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn meeting(store: &mut MemoryStore) -> Meeting {
        store
            .seed(Meeting {
                season_id: 232,
                code: "reggio".into(),
                description: "Trofeo".into(),
                header_date: NaiveDate::from_ymd_opt(2024, 2, 24).unwrap(),
                ..Meeting::default()
            })
            .unwrap()
    }

    fn attach(store: &mut MemoryStore, session: &MeetingSession, code: &str) {
        let event_type = store.seed(EventType { code: code.into(), ..EventType::default() }).unwrap();
        store
            .seed(MeetingEvent {
                meeting_session_id: session.id.unwrap(),
                event_type_id: event_type.id.unwrap(),
                ..MeetingEvent::default()
            })
            .unwrap();
    }

    #[test]
    fn creates_session_from_draft() {
        let mut store = MemoryStore::new();
        let meeting = meeting(&mut store);
        let draft = &extract_sessions("Sabato 24 febbraio\nRiscaldamento ore 14.00\nore 15.00 400 SL")[0];
        let mut resolver = SessionResolver::new(draft, &meeting, Some(3), Throttle::new(true, 30, now()));
        let session = resolver.resolve(&mut store).unwrap();
        assert_eq!(session.scheduled_date, NaiveDate::from_ymd_opt(2024, 2, 24).unwrap());
        assert_eq!(session.begin_time, NaiveTime::from_hms_opt(15, 0, 0));
        assert_eq!(session.warm_up_time, NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(session.day_part, Some(DayPart::Afternoon));
        assert_eq!(session.swimming_pool_id, Some(3));
        assert!(resolver.diff.has_changes());
    }

    #[test]
    fn event_set_identifies_a_moved_session() {
        let mut store = MemoryStore::new();
        let meeting = meeting(&mut store);
        let existing = store
            .seed(MeetingSession {
                meeting_id: meeting.id.unwrap(),
                session_order: 1,
                scheduled_date: NaiveDate::from_ymd_opt(2024, 2, 25).unwrap(),
                description: "Sessione 1".into(),
                ..MeetingSession::default()
            })
            .unwrap();
        attach(&mut store, &existing, "400SL");
        attach(&mut store, &existing, "50DO");

        let draft = &extract_sessions("Sabato 24 febbraio ore 9.00\n50 dorso, 400 SL")[0];
        let mut resolver = SessionResolver::new(draft, &meeting, None, Throttle::new(true, 30, now()));
        let session = resolver.resolve(&mut store).unwrap();
        assert_eq!(session.id, existing.id);
        assert_eq!(session.scheduled_date, NaiveDate::from_ymd_opt(2024, 2, 24).unwrap());
        assert_eq!(store.count::<MeetingSession>(), 1);
    }

    #[test]
    fn different_event_set_on_same_day_is_a_new_session() {
        let mut store = MemoryStore::new();
        let meeting = meeting(&mut store);
        let existing = store
            .seed(MeetingSession {
                meeting_id: meeting.id.unwrap(),
                scheduled_date: NaiveDate::from_ymd_opt(2024, 2, 24).unwrap(),
                day_part: Some(DayPart::Morning),
                ..MeetingSession::default()
            })
            .unwrap();
        attach(&mut store, &existing, "100FA");

        let draft = &extract_sessions("Sabato 24 febbraio ore 9.00\n200 RA")[0];
        SessionResolver::new(draft, &meeting, None, Throttle::new(true, 30, now())).resolve(&mut store).unwrap();
        assert_eq!(store.count::<MeetingSession>(), 2);
    }

    #[test]
    fn empty_placeholder_sessions_are_reused() {
        let mut store = MemoryStore::new();
        let meeting = meeting(&mut store);
        let placeholder = store
            .seed(MeetingSession {
                meeting_id: meeting.id.unwrap(),
                scheduled_date: NaiveDate::from_ymd_opt(2024, 2, 24).unwrap(),
                day_part: Some(DayPart::Morning),
                ..MeetingSession::default()
            })
            .unwrap();

        let draft = &extract_sessions("Sabato 24 febbraio ore 9.00\n200 RA")[0];
        let session =
            SessionResolver::new(draft, &meeting, None, Throttle::new(true, 30, now())).resolve(&mut store).unwrap();
        assert_eq!(session.id, placeholder.id);
    }

    #[test]
    fn unpersisted_meeting_is_a_precondition_error() {
        let mut store = MemoryStore::new();
        let draft = &extract_sessions("Sabato 24 febbraio ore 9.00\n200 RA")[0];
        let err = SessionResolver::new(draft, &Meeting::default(), None, Throttle::new(true, 30, now()))
            .resolve(&mut store)
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }
}
