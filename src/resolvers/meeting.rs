//! Meeting resolution for one calendar entry.
//!
//! Search tiers, first hit wins:
//!
//! 1. season + header date + code
//! 2. season + code (rescheduled meeting)
//! 3. season + header date + code LIKE city token
//! 4. season + header date + code LIKE title token
//! 5. season + header date + description LIKE title word (not for regional championships)

use super::text::{
    city_name_candidate, description_token, edition_from_title, entry_deadline, is_regional, normalize,
    timing_from_text, title_code_token,
};
use super::{Throttle, insert_logged, update_logged};
use crate::audit::DiffLog;
use crate::error::{Error, Result};
use crate::model::{CalendarEntry, EditionType, Meeting, Season, calendar_header_date};
use crate::store::criteria::for_season;
use crate::store::{Criteria, MeetingIdAllocator, Repository};
use chrono::NaiveDate;

/// Tiers matching on the full code; later tiers match on partial tokens.
const EXACT_TIERS: usize = 2;

/// Meeting code derived from the calendar's external code.
pub fn meeting_code(external_code: &str) -> String {
    normalize(external_code)
}

pub struct MeetingResolver<'a, A: MeetingIdAllocator> {
    entry: CalendarEntry,
    season: Season,
    federation_code: String,
    allocator: &'a A,
    throttle: Throttle,
    result: Option<Meeting>,
    pub diff: DiffLog,
}

impl<'a, A: MeetingIdAllocator> MeetingResolver<'a, A> {
    pub fn new(entry: &CalendarEntry, season: &Season, federation_code: &str, allocator: &'a A, throttle: Throttle) -> Self {
        MeetingResolver {
            entry: entry.clone(),
            season: season.clone(),
            federation_code: federation_code.to_string(),
            allocator,
            throttle,
            result: None,
            diff: DiffLog::new(),
        }
    }

    /// Find, update or create the entry's meeting. `None` when the entry has
    /// neither a usable code nor a place and name to derive one from.
    pub fn resolve<R: Repository>(&mut self, store: &mut R) -> Result<Option<Meeting>> {
        if let Some(meeting) = &self.result {
            return Ok(Some(meeting.clone()));
        }
        let Some(season_id) = self.season.id else {
            return Err(Error::Precondition("season must be persisted before resolving meetings".into()));
        };

        let code = meeting_code(&self.entry.meeting_code);
        if code.is_empty() && (self.entry.place.trim().is_empty() || self.entry.name.trim().is_empty()) {
            tracing::debug!(name = %self.entry.name, "entry has no usable code, place or name");
            return Ok(None);
        }
        let code = if code.is_empty() { normalize(&format!("{}{}", self.entry.place, self.entry.name)) } else { code };
        let Some(header_date) = calendar_header_date(&self.entry, &self.season) else {
            return Err(Error::Precondition(format!(
                "unreadable date '{} {} {}' for {}",
                self.entry.dates, self.entry.month, self.entry.year, self.entry.meeting_code
            )));
        };

        let desired = self.desired(season_id, &code, header_date);
        let meeting = match self.search(store, season_id, &code, header_date)? {
            Some(found) => self.update(store, found, &desired)?,
            None => self.create(store, desired)?,
        };
        self.result = Some(meeting.clone());
        Ok(Some(meeting))
    }

    fn search<R: Repository>(
        &self,
        store: &R,
        season_id: i64,
        code: &str,
        header_date: NaiveDate,
    ) -> Result<Option<Meeting>> {
        let dated = for_season(season_id).eq("header_date", header_date);
        let mut tiers: Vec<(&str, Criteria)> =
            vec![("date+code", dated.clone().eq("code", code)), ("code", for_season(season_id).eq("code", code))];

        let city_token = normalize(&city_name_candidate(&self.entry.place));
        if !city_token.is_empty() {
            tiers.push(("city token", dated.clone().like("code", city_token)));
        }
        if let Some(token) = title_code_token(&self.entry.name) {
            tiers.push(("title token", dated.clone().like("code", token)));
        }
        if is_regional(&self.entry.name) {
            tracing::debug!(name = %self.entry.name, "regional meeting: description tier skipped");
        } else if let Some(token) = description_token(&self.entry.name) {
            tiers.push(("description token", dated.like("description", token)));
        }

        for (idx, (tier, criteria)) in tiers.iter().enumerate() {
            for found in store.find_many::<Meeting>(criteria)? {
                // Partial tiers never take over a meeting another calendar row already links.
                if idx >= EXACT_TIERS && self.linked_elsewhere(store, season_id, &found)? {
                    tracing::debug!(tier, id = found.id, code = %found.code, "meeting linked by another row, skipped");
                    continue;
                }
                tracing::debug!(tier, id = found.id, code = %found.code, "meeting matched");
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn linked_elsewhere<R: Repository>(&self, store: &R, season_id: i64, meeting: &Meeting) -> Result<bool> {
        let Some(meeting_id) = meeting.id else {
            return Ok(false);
        };
        let own_code = self.entry.meeting_code.trim();
        let rows: Vec<CalendarEntry> = store.find_many(&for_season(season_id).eq("meeting_id", meeting_id))?;
        Ok(rows.iter().any(|row| row.meeting_code.trim() != own_code))
    }

    fn desired(&self, season_id: i64, code: &str, header_date: NaiveDate) -> Meeting {
        let entry = &self.entry;
        let (edition, edition_type) = edition_from_title(&entry.name);
        let text = format!("{}\n{}", entry.program, entry.organization);
        Meeting {
            id: None,
            season_id,
            code: code.to_string(),
            description: entry.name.trim().to_string(),
            header_date,
            header_year: self.season.header_year.clone(),
            edition,
            edition_type,
            timing_type: timing_from_text(&text).unwrap_or_default(),
            confirmed: !entry.manifest_link.trim().is_empty() && !entry.cancelled,
            cancelled: entry.cancelled,
            entry_deadline: entry_deadline(&text),
            invitation: entry.manifest_link.trim().to_string(),
            ..Meeting::default()
        }
    }

    fn update<R: Repository>(&mut self, store: &mut R, found: Meeting, desired: &Meeting) -> Result<Meeting> {
        if found.do_not_update {
            tracing::debug!(id = found.id, "meeting flagged do-not-update");
            return Ok(found);
        }

        let mut meeting = found;
        let mut changes = Vec::new();
        if !desired.code.is_empty() {
            assign_changed!(changes, meeting.code, desired.code.clone());
        }
        assign_changed!(changes, meeting.header_date, desired.header_date);
        if !desired.header_year.is_empty() {
            assign_changed!(changes, meeting.header_year, desired.header_year.clone());
        }
        if !desired.description.is_empty() {
            assign_changed!(changes, meeting.description, desired.description.clone());
        }
        assign_changed!(changes, meeting.confirmed, desired.confirmed);
        assign_changed!(changes, meeting.cancelled, desired.cancelled);
        if desired.edition_type != EditionType::None {
            assign_changed!(changes, meeting.edition, desired.edition);
            assign_changed!(changes, meeting.edition_type, desired.edition_type);
        }
        if timing_from_text(&format!("{}\n{}", self.entry.program, self.entry.organization)).is_some() {
            assign_changed!(changes, meeting.timing_type, desired.timing_type);
        }
        if desired.entry_deadline.is_some() {
            assign_changed!(changes, meeting.entry_deadline, desired.entry_deadline);
        }
        if !desired.invitation.is_empty() {
            assign_changed!(changes, meeting.invitation, desired.invitation.clone());
        }

        let action = format!("Meeting updated: {} ({})", meeting.description, changes.join(", "));
        if update_logged(store, &mut meeting, &changes, self.throttle.now(), &mut self.diff, action)? {
            tracing::info!(id = meeting.id, ?changes, "meeting updated");
        }
        Ok(meeting)
    }

    fn create<R: Repository>(&mut self, store: &mut R, mut meeting: Meeting) -> Result<Meeting> {
        let id = match self.allocator.allocate(store, &self.season, &self.federation_code) {
            Some(id) => id,
            None => {
                let id = store.next_id::<Meeting>()?;
                tracing::warn!(
                    id,
                    federation = %self.federation_code,
                    season = %self.season.header_year,
                    "reserved meeting-id range exhausted, using store-assigned id"
                );
                id
            }
        };
        meeting.id = Some(id);
        let action = format!("Meeting created: {} ({})", meeting.description, meeting.code);
        insert_logged(store, &mut meeting, self.throttle.now(), &mut self.diff, action)?;
        tracing::info!(id = meeting.id, code = %meeting.code, "meeting created");
        Ok(meeting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ReservedRangeAllocator};
    use chrono::NaiveDateTime;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn season() -> Season {
        Season::starting(232, 2023, "FIN").unwrap()
    }

    fn entry() -> CalendarEntry {
        CalendarEntry {
            season_id: 232,
            meeting_code: "reggioemilia-2024".into(),
            name: "3° Trofeo Città di Reggio Emilia".into(),
            place: "piscina comunale, via Melato, Reggio Emilia".into(),
            dates: "24-25".into(),
            month: "Febbraio".into(),
            manifest_link: "https://example.org/manifest.pdf".into(),
            program: "Chiusura iscrizioni 12/02/2024\nSabato 24 febbraio ore 15.00 400 SL".into(),
            ..CalendarEntry::default()
        }
    }

    fn resolve(store: &mut MemoryStore, entry: &CalendarEntry) -> (Option<Meeting>, DiffLog) {
        let allocator = ReservedRangeAllocator::default();
        let mut resolver = MeetingResolver::new(entry, &season(), "FIN", &allocator, Throttle::new(true, 30, now()));
        let meeting = resolver.resolve(store).unwrap();
        (meeting, resolver.diff)
    }

    #[test]
    fn creates_meeting_with_reserved_id_and_extracted_fields() {
        let mut store = MemoryStore::new();
        let (meeting, diff) = resolve(&mut store, &entry());
        let meeting = meeting.unwrap();
        assert_eq!(meeting.id, Some(231_001));
        assert_eq!(meeting.code, "reggioemilia2024");
        assert_eq!(meeting.header_date, NaiveDate::from_ymd_opt(2024, 2, 24).unwrap());
        assert_eq!((meeting.edition, meeting.edition_type), (3, EditionType::Ordinal));
        assert_eq!(meeting.entry_deadline, NaiveDate::from_ymd_opt(2024, 2, 12));
        assert!(meeting.confirmed);
        assert_eq!(diff.change_count(), 1);
    }

    #[test]
    fn second_resolution_matches_without_changes() {
        let mut store = MemoryStore::new();
        let (first, _) = resolve(&mut store, &entry());
        let (second, diff) = resolve(&mut store, &entry());
        assert_eq!(first, second);
        assert!(!diff.has_changes());
        assert_eq!(store.count::<Meeting>(), 1);
    }

    #[test]
    fn rescheduled_meeting_is_found_by_code_and_moved() {
        let mut store = MemoryStore::new();
        resolve(&mut store, &entry());
        let moved = CalendarEntry { dates: "2".into(), month: "Marzo".into(), ..entry() };
        let (meeting, diff) = resolve(&mut store, &moved);
        assert_eq!(meeting.unwrap().header_date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert!(diff.sql[0].starts_with("UPDATE meetings SET header_date='2024-03-02'"));
        assert_eq!(store.count::<Meeting>(), 1);
    }

    #[test]
    fn do_not_update_is_honored() {
        let mut store = MemoryStore::new();
        let (meeting, _) = resolve(&mut store, &entry());
        let mut locked = meeting.unwrap();
        locked.do_not_update = true;
        locked.description = "Manually edited".into();
        store.save(&mut locked).unwrap();

        let (again, diff) = resolve(&mut store, &entry());
        assert_eq!(again.unwrap().description, "Manually edited");
        assert!(!diff.has_changes());
    }

    #[test]
    fn description_tier_is_skipped_for_regional_championships() {
        let mut store = MemoryStore::new();
        let header_date = NaiveDate::from_ymd_opt(2024, 2, 24).unwrap();
        store
            .seed(Meeting {
                season_id: 232,
                code: "unrelated".into(),
                description: "Campionati Regionali Emilia".into(),
                header_date,
                ..Meeting::default()
            })
            .unwrap();

        let regional = CalendarEntry {
            meeting_code: "crer-2024".into(),
            name: "Campionati Regionali Master".into(),
            place: "Bologna".into(),
            ..entry()
        };
        resolve(&mut store, &regional);
        assert_eq!(store.count::<Meeting>(), 2);
    }

    #[test]
    fn partial_tiers_skip_meetings_linked_by_another_row() {
        let mut store = MemoryStore::new();
        let (reggio, _) = resolve(&mut store, &entry());
        let reggio = reggio.unwrap();
        store.seed(CalendarEntry { season_id: 232, meeting_id: reggio.id, ..entry() }).unwrap();

        // Same date and place: the city token tier alone would match Reggio's meeting.
        let modena = CalendarEntry { meeting_code: "modena-2024".into(), name: "Trofeo Master Modena".into(), ..entry() };
        let (meeting, _) = resolve(&mut store, &modena);
        let meeting = meeting.unwrap();
        assert_ne!(meeting.id, reggio.id);
        assert_eq!(meeting.code, "modena2024");
        assert_eq!(store.find_by_id::<Meeting>(reggio.id.unwrap()).unwrap(), Some(reggio));
    }

    struct Exhausted;

    impl MeetingIdAllocator for Exhausted {
        fn allocate<R: Repository>(&self, _store: &R, _season: &Season, _federation_code: &str) -> Option<i64> {
            None
        }
    }

    #[test]
    fn exhausted_range_falls_back_to_the_next_store_id() {
        let mut store = MemoryStore::new();
        store.seed(Meeting { id: Some(7), season_id: 1, code: "old".into(), ..Meeting::default() }).unwrap();
        let mut resolver = MeetingResolver::new(&entry(), &season(), "FIN", &Exhausted, Throttle::new(true, 30, now()));
        let meeting = resolver.resolve(&mut store).unwrap().unwrap();
        assert_eq!(meeting.id, Some(8));
    }

    #[test]
    fn entries_without_code_place_or_name_are_skipped() {
        let mut store = MemoryStore::new();
        let bare = CalendarEntry { meeting_code: String::new(), place: String::new(), ..entry() };
        let (meeting, diff) = resolve(&mut store, &bare);
        assert!(meeting.is_none());
        assert!(!diff.has_changes());
    }
}
