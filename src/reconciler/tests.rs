use super::*;
use crate::geocode::NoGeocoder;
use crate::model::{City, MeetingEvent, MeetingSession, SwimmingPool};
use crate::store::MemoryStore;
use chrono::NaiveDate;

const PROGRAM: &str = "Sabato 2 marzo\nore 9.00 riscaldamento\n50 SL - 100 RA\nore 15.00\n200 MI, staffetta 4x50 SL";

fn season() -> Season {
    Season::starting(232, 2023, "FIN").unwrap()
}

fn store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.seed(season()).unwrap();
    store
}

fn entry(code: &str) -> CalendarEntry {
    CalendarEntry {
        meeting_code: code.into(),
        name: "3° Trofeo Città di Reggio Emilia".into(),
        place: "piscina comunale, via Melato, Reggio Emilia".into(),
        dates: "2".into(),
        month: "Marzo".into(),
        manifest_link: "https://example.org/manifest.pdf".into(),
        program: PROGRAM.into(),
        ..CalendarEntry::default()
    }
}

fn run(store: &mut MemoryStore, feed: &[CalendarEntry]) -> RunReport {
    CalendarReconciler::new(store, &NoGeocoder, &season(), &Context::default(), &Options::default()).run(feed)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn seeded_meeting(store: &mut MemoryStore, code: &str, results_acquired: bool, cancelled: bool) -> Meeting {
    store
        .seed(Meeting {
            season_id: 232,
            code: code.into(),
            description: format!("Meeting {code}"),
            header_date: date(2023, 11, 5),
            results_acquired,
            cancelled,
            ..Meeting::default()
        })
        .unwrap()
}

#[test]
fn full_run_builds_meeting_sessions_and_events() {
    let mut store = store();
    let report = run(&mut store, &[entry("reggioemilia-2024")]);

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!((report.processed, report.skipped), (1, 0));
    assert_eq!(store.count::<Meeting>(), 1);
    assert_eq!(store.count::<MeetingSession>(), 2);
    assert_eq!(store.count::<MeetingEvent>(), 4);

    let row = &store.all::<CalendarEntry>()[0];
    assert_eq!(row.season_id, 232);
    assert_eq!(row.meeting_id, store.all::<Meeting>()[0].id);
    assert!(report.diff.to_sql_script().contains("INSERT INTO meetings"));
}

#[test]
fn second_run_is_idempotent() {
    let mut store = store();
    let feed = [entry("reggioemilia-2024")];
    run(&mut store, &feed);

    let report = run(&mut store, &feed);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert!(!report.diff.has_changes(), "{:?}", report.diff);
    assert_eq!(store.count::<CalendarEntry>(), 1);
    assert_eq!(store.count::<Meeting>(), 1);
    assert_eq!(store.count::<MeetingSession>(), 2);
    assert_eq!(store.count::<MeetingEvent>(), 4);
}

#[test]
fn same_day_meetings_in_one_city_stay_apart() {
    let mut store = store();
    let modena = CalendarEntry { name: "Trofeo Master Modena".into(), ..entry("modena-2024") };
    let feed = [entry("reggioemilia-2024"), modena];
    let report = run(&mut store, &feed);
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let codes: Vec<String> = store.all::<Meeting>().into_iter().map(|m| m.code).collect();
    assert_eq!(codes, vec!["reggioemilia2024", "modena2024"]);
    let links: Vec<Option<i64>> = store.all::<CalendarEntry>().into_iter().map(|e| e.meeting_id).collect();
    assert_ne!(links[0], links[1]);

    let again = run(&mut store, &feed);
    assert!(!again.diff.has_changes(), "{:?}", again.diff);
    assert_eq!(store.count::<Meeting>(), 2);
}

#[test]
fn pool_override_without_a_city_reuses_the_entry_city() {
    let mut store = store();
    let program = "Sabato 2 marzo\nore 9.00 50 SL, 100 RA\nVasca 50 mt\nore 15.00 200 MI";
    let feed = [CalendarEntry { program: program.into(), ..entry("reggioemilia-2024") }];
    run(&mut store, &feed);
    assert_eq!(store.count::<City>(), 1);
    assert!(store.count::<SwimmingPool>() >= 1);

    let again = run(&mut store, &feed);
    assert!(!again.diff.has_changes(), "{:?}", again.diff);
    assert_eq!(store.count::<City>(), 1);
}

#[test]
fn event_orders_increase_across_sessions() {
    let mut store = store();
    run(&mut store, &[entry("reggioemilia-2024")]);

    let sessions = store.all::<MeetingSession>();
    let order_of = |session_id: i64| sessions.iter().find(|s| s.id == Some(session_id)).map(|s| s.session_order);
    let mut events = store.all::<MeetingEvent>();
    events.sort_by_key(|e| e.event_order);

    assert_eq!(events.iter().map(|e| e.event_order).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    let session_orders: Vec<_> = events.iter().map(|e| order_of(e.meeting_session_id)).collect();
    assert_eq!(session_orders, vec![Some(1), Some(1), Some(2), Some(2)]);
    assert!(sessions.iter().all(|s| s.scheduled_date == date(2024, 3, 2)));
}

#[test]
fn incomplete_and_duplicate_rows_are_skipped() {
    let mut store = store();
    let no_program = CalendarEntry { program: String::new(), ..entry("modena-2024") };
    let report = run(&mut store, &[entry("reggioemilia-2024"), entry("reggioemilia-2024"), no_program]);

    assert_eq!((report.processed, report.skipped), (1, 2));
    assert_eq!(store.count::<CalendarEntry>(), 2);
    assert_eq!(store.count::<Meeting>(), 1);
}

#[test]
fn results_acquired_meetings_are_linked_but_left_alone() {
    let mut store = store();
    let meeting = store
        .seed(Meeting {
            season_id: 232,
            code: "reggioemilia2024".into(),
            description: "3° Trofeo Città di Reggio Emilia".into(),
            header_date: date(2024, 3, 2),
            results_acquired: true,
            ..Meeting::default()
        })
        .unwrap();
    let empty = MeetingSession { meeting_id: meeting.id.unwrap(), session_order: 1, ..MeetingSession::default() };
    let empty = store.seed(empty).unwrap();

    let report = run(&mut store, &[entry("reggioemilia-2024")]);
    assert_eq!(report.processed, 1);
    assert_eq!(store.count::<MeetingEvent>(), 0);
    assert_eq!(store.all::<MeetingSession>(), vec![empty]);
    assert_eq!(store.all::<CalendarEntry>()[0].meeting_id, meeting.id);
}

#[test]
fn results_acquired_meetings_are_rebuilt_when_forced() {
    let mut store = store();
    store
        .seed(Meeting {
            season_id: 232,
            code: "reggioemilia2024".into(),
            description: "3° Trofeo Città di Reggio Emilia".into(),
            header_date: date(2024, 3, 2),
            results_acquired: true,
            ..Meeting::default()
        })
        .unwrap();

    let options = Options { force_reprocess: true, ..Options::default() };
    let report = CalendarReconciler::new(&mut store, &NoGeocoder, &season(), &Context::default(), &options)
        .run(&[entry("reggioemilia-2024")]);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(store.count::<MeetingEvent>(), 4);
}

#[test]
fn feed_sync_updates_rows_and_deletes_stale_ones() {
    let mut store = store();
    let acquired = seeded_meeting(&mut store, "bologna2023", true, false);
    store.seed(CalendarEntry { season_id: 232, ..entry("old-code") }).unwrap();
    store
        .seed(CalendarEntry { season_id: 232, meeting_id: acquired.id, ..entry("bologna-2023") })
        .unwrap();
    let current = store
        .seed(CalendarEntry { season_id: 232, name: "Trofeo provvisorio".into(), ..entry("reggioemilia-2024") })
        .unwrap();

    let mut report = RunReport::default();
    let mut reconciler =
        CalendarReconciler::new(&mut store, &NoGeocoder, &season(), &Context::default(), &Options::default());
    let rows = reconciler.sync_feed(&[entry(" reggioemilia-2024 ")], &mut report).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, current.id);
    assert_eq!(rows[0].name, "3° Trofeo Città di Reggio Emilia");
    let codes: Vec<String> = store.all::<CalendarEntry>().into_iter().map(|e| e.meeting_code).collect();
    assert_eq!(codes, vec!["bologna-2023", "reggioemilia-2024"]);
    assert_eq!(report.diff.change_count(), 2);
    assert!(report.diff.to_sql_script().contains("DELETE FROM calendars"));
}

#[test]
fn cleanup_cascades_unlinked_meetings_and_keeps_cancelled_ones() {
    let mut store = store();
    let orphan = seeded_meeting(&mut store, "orphan2023", false, false);
    let cancelled = seeded_meeting(&mut store, "cancelled2023", false, true);
    let session = MeetingSession { meeting_id: orphan.id.unwrap(), session_order: 1, ..MeetingSession::default() };
    let session = store.seed(session).unwrap();
    store.seed(MeetingEvent { meeting_session_id: session.id.unwrap(), event_order: 1, ..MeetingEvent::default() }).unwrap();
    store.seed(MeetingSession { meeting_id: cancelled.id.unwrap(), session_order: 1, ..MeetingSession::default() }).unwrap();

    let diff = CalendarReconciler::new(&mut store, &NoGeocoder, &season(), &Context::default(), &Options::default())
        .cleanup()
        .unwrap();

    // event, session and meeting of the orphan, plus the cancelled meeting's empty session
    assert_eq!(diff.change_count(), 4);
    assert_eq!(store.all::<Meeting>(), vec![cancelled]);
    assert_eq!(store.count::<MeetingSession>(), 0);
    assert_eq!(store.count::<MeetingEvent>(), 0);
}

#[test]
fn a_failing_row_does_not_abort_the_run() {
    let mut store = store();
    let broken = CalendarEntry { dates: "da definire".into(), ..entry("broken-2024") };
    let report = run(&mut store, &[broken, entry("reggioemilia-2024")]);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].meeting_code, "broken-2024");
    assert!(report.errors[0].message.contains("unreadable date"));
    assert_eq!(report.processed, 1);
    assert_eq!(store.count::<Meeting>(), 1);
    assert!(report.diff.to_sql_script().contains("-- ERROR"));
}

#[test]
fn unpersisted_season_is_a_precondition_error() {
    let mut store = store();
    let season = Season { id: None, ..season() };
    let mut reconciler =
        CalendarReconciler::new(&mut store, &NoGeocoder, &season, &Context::default(), &Options::default());
    let report = reconciler.run(&[entry("reggioemilia-2024")]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(store.count::<CalendarEntry>(), 0);
}
