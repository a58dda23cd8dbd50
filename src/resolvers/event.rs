//! Event resolution. A meeting holds at most one event per event type, so the
//! lookup spans every session of the meeting and a match found elsewhere is
//! moved to the target session. Orders run across the whole meeting.

use super::{Throttle, insert_logged, update_logged};
use crate::audit::DiffLog;
use crate::error::{Error, Result};
use crate::model::{EventType, HeatType, MeetingEvent, MeetingSession};
use crate::parser::{EventTypeAttrs, EventTypeLookup, resolve_event_type};
use crate::store::Repository;
use crate::store::criteria::{for_meeting, for_session};

pub struct EventResolver {
    attrs: Vec<EventTypeAttrs>,
    session: MeetingSession,
    create_missing_event_types: bool,
    throttle: Throttle,
    result: Option<(Vec<MeetingEvent>, i64)>,
    pub diff: DiffLog,
}

impl EventResolver {
    pub fn new(
        attrs: Vec<EventTypeAttrs>,
        session: &MeetingSession,
        create_missing_event_types: bool,
        throttle: Throttle,
    ) -> Self {
        EventResolver {
            attrs,
            session: session.clone(),
            create_missing_event_types,
            throttle,
            result: None,
            diff: DiffLog::new(),
        }
    }

    /// Resolve every event of the session. Returns the events and the running
    /// order to pass to the next session.
    pub fn resolve<R: Repository>(&mut self, store: &mut R, running_order: i64) -> Result<(Vec<MeetingEvent>, i64)> {
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }
        let Some(session_id) = self.session.id else {
            return Err(Error::Precondition("session must be persisted before resolving events".into()));
        };

        let mut meeting_events: Vec<MeetingEvent> = Vec::new();
        for session in store.find_many::<MeetingSession>(&for_meeting(self.session.meeting_id))? {
            let Some(id) = session.id else { continue };
            meeting_events.extend(store.find_many::<MeetingEvent>(&for_session(id))?);
        }

        let mut running = running_order;
        let mut events = Vec::new();
        for attrs in self.attrs.clone() {
            let Some(event_type) = self.event_type(store, &attrs)? else { continue };
            let Some(event_type_id) = event_type.id else { continue };

            let event = match meeting_events.iter().position(|e| e.event_type_id == event_type_id) {
                Some(idx) => {
                    let mut event = meeting_events[idx].clone();
                    running = running.max(event.event_order);
                    if event.meeting_session_id != session_id {
                        event.meeting_session_id = session_id;
                        let action = format!("Event moved: {} to session #{}", event_type.code, self.session.session_order);
                        update_logged(
                            store,
                            &mut event,
                            &["meeting_session_id"],
                            self.throttle.now(),
                            &mut self.diff,
                            action,
                        )?;
                        tracing::info!(code = %event_type.code, session_id, "event moved");
                        meeting_events[idx] = event.clone();
                    }
                    event
                }
                None => {
                    let meeting_max = meeting_events.iter().map(|e| e.event_order).max().unwrap_or(0);
                    running = running.max(meeting_max) + 1;
                    let mut event = MeetingEvent {
                        id: None,
                        meeting_session_id: session_id,
                        event_type_id,
                        event_order: running,
                        heat_type: HeatType::Finals,
                        out_of_race: false,
                        begin_time: None,
                        updated_at: None,
                    };
                    let action = format!("Event created: #{} {}", running, event_type.code);
                    insert_logged(store, &mut event, self.throttle.now(), &mut self.diff, action)?;
                    tracing::debug!(code = %event_type.code, order = running, "event created");
                    meeting_events.push(event.clone());
                    event
                }
            };
            events.push(event);
        }

        self.result = Some((events.clone(), running));
        Ok((events, running))
    }

    fn event_type<R: Repository>(&mut self, store: &mut R, attrs: &EventTypeAttrs) -> Result<Option<EventType>> {
        match resolve_event_type(store, attrs)? {
            EventTypeLookup::Found(event_type) => Ok(Some(event_type)),
            EventTypeLookup::Missing(descriptor) if self.create_missing_event_types => {
                let mut event_type = descriptor.to_event_type();
                let action = format!("Event type created: {}", event_type.code);
                insert_logged(store, &mut event_type, self.throttle.now(), &mut self.diff, action)?;
                tracing::info!(code = %event_type.code, "event type created");
                Ok(Some(event_type))
            }
            EventTypeLookup::Missing(descriptor) => {
                tracing::warn!(code = %descriptor.code, "unknown event type, event skipped");
                self.diff.note(format!("Unknown event type skipped: {}", descriptor.code));
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_event_token;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveDateTime};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn attrs(tokens: &[&str]) -> Vec<EventTypeAttrs> {
        tokens.iter().filter_map(|t| parse_event_token(t)).collect()
    }

    fn session(store: &mut MemoryStore, order: i64) -> MeetingSession {
        store.seed(MeetingSession { meeting_id: 1, session_order: order, ..MeetingSession::default() }).unwrap()
    }

    #[test]
    fn orders_accumulate_across_sessions() {
        let mut store = MemoryStore::new();
        let first = session(&mut store, 1);
        let second = session(&mut store, 2);

        let mut resolver = EventResolver::new(attrs(&["50 SL", "100 DO"]), &first, true, Throttle::new(true, 30, now()));
        let (events, running) = resolver.resolve(&mut store, 0).unwrap();
        assert_eq!(events.iter().map(|e| e.event_order).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(running, 2);

        let mut resolver = EventResolver::new(attrs(&["200 MI"]), &second, true, Throttle::new(true, 30, now()));
        let (events, running) = resolver.resolve(&mut store, running).unwrap();
        assert_eq!(events[0].event_order, 3);
        assert_eq!(running, 3);
        assert_eq!(store.count::<EventType>(), 3);
    }

    #[test]
    fn an_event_type_appears_once_per_meeting_and_is_moved() {
        let mut store = MemoryStore::new();
        let first = session(&mut store, 1);
        let second = session(&mut store, 2);
        EventResolver::new(attrs(&["50 SL", "100 DO"]), &first, true, Throttle::new(true, 30, now()))
            .resolve(&mut store, 0)
            .unwrap();

        let mut resolver = EventResolver::new(attrs(&["100 DO"]), &second, true, Throttle::new(true, 30, now()));
        let (events, _) = resolver.resolve(&mut store, 0).unwrap();
        assert_eq!(store.count::<MeetingEvent>(), 2);
        assert_eq!(events[0].meeting_session_id, second.id.unwrap());
        assert_eq!(events[0].event_order, 2);
        assert!(resolver.diff.sql[0].starts_with("UPDATE meeting_events SET meeting_session_id="));
    }

    #[test]
    fn events_of_other_meetings_are_ignored() {
        let mut store = MemoryStore::new();
        let other = store.seed(MeetingSession { meeting_id: 2, session_order: 1, ..MeetingSession::default() }).unwrap();
        let mut resolver = EventResolver::new(attrs(&["50 SL"]), &other, true, Throttle::new(true, 30, now()));
        resolver.resolve(&mut store, 8).unwrap();

        let first = session(&mut store, 1);
        let mut resolver = EventResolver::new(attrs(&["50 SL", "50 SL"]), &first, true, Throttle::new(true, 30, now()));
        let (events, running) = resolver.resolve(&mut store, 0).unwrap();
        assert_eq!(events.iter().map(|e| e.event_order).collect::<Vec<_>>(), vec![1, 1]);
        assert_eq!(running, 1);
        assert_eq!(store.count::<MeetingEvent>(), 2);
        assert_eq!(resolver.diff.change_count(), 1);
    }

    #[test]
    fn unknown_types_are_skipped_when_creation_is_disabled() {
        let mut store = MemoryStore::new();
        let first = session(&mut store, 1);
        let mut resolver = EventResolver::new(attrs(&["1500 SL"]), &first, false, Throttle::new(true, 30, now()));
        let (events, running) = resolver.resolve(&mut store, 4).unwrap();
        assert!(events.is_empty());
        assert_eq!(running, 4);
        assert!(!resolver.diff.has_changes());
    }
}
