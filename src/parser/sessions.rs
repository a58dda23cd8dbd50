//! Session drafts: grouping program tokens by date/time boundaries.
//!
//! Program text interleaves dates, start times, warm-up notes and events with
//! no reliable delimiters, so draft boundaries are contextual:
//!
//! ```text
//! line has DATE   ──▶ flush current draft, open a new one (day, month, order+1)
//!                     (not for notes such as entry deadlines)
//! TIME token      ──▶ current draft has a start time? open a sibling draft
//!                     with the same date : fill the start time
//! event / relay   ──▶ append to current draft
//! warm-up token   ──▶ append; its time (if any) becomes the warm-up time
//! pool mention    ──▶ remembered; attached to the next draft that is flushed
//! ```
//!
//! After the scan, warm-up-only drafts are folded into the following draft and
//! events are deduplicated by event-type code across all drafts (first
//! occurrence wins). Drafts left without events are dropped.

use super::event_type::{EventTypeAttrs, parse_event_token};
use super::tokenizer::{LineKind, classify, date_re, is_session_line, program_lines, tokenize_line};
use crate::model::{DayPart, MeetingEvent};
use crate::{Token, TokenKind};
use chrono::{Datelike, NaiveDate, NaiveTime};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDraft {
    pub session_order: i64,
    pub day: Option<String>,
    pub month: Option<String>,
    /// Raw start-time token, e.g. `"ore 9.00"`.
    pub start_time: Option<String>,
    /// Raw warm-up token or time.
    pub warm_up_time: Option<String>,
    /// Event, relay and warm-up tokens in source order.
    pub tokens: Vec<Token>,
    pub pool_override: Option<String>,
    pub day_part_hint: Option<DayPart>,
    /// Events resolved for this draft by the reconciler.
    pub meeting_events: Vec<MeetingEvent>,
}

impl SessionDraft {
    fn new(session_order: i64, day: Option<String>, month: Option<String>) -> Self {
        SessionDraft { session_order, day, month, ..SessionDraft::default() }
    }

    pub fn has_events(&self) -> bool {
        self.tokens.iter().any(|t| t.kind.is_event())
    }

    pub fn is_warm_up_only(&self) -> bool {
        self.tokens.iter().any(|t| t.kind == TokenKind::WarmUp) && !self.has_events()
    }

    pub fn event_tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.kind.is_event())
    }

    pub fn event_types(&self) -> Vec<EventTypeAttrs> {
        self.event_tokens().filter_map(|t| parse_event_token(&t.text)).collect()
    }

    pub fn event_codes(&self) -> Vec<String> {
        self.event_types().iter().map(EventTypeAttrs::code).collect()
    }

    pub fn begin_time(&self) -> Option<NaiveTime> {
        self.start_time.as_deref().and_then(parse_clock)
    }

    pub fn warm_up(&self) -> Option<NaiveTime> {
        self.warm_up_time.as_deref().and_then(parse_clock)
    }

    /// Keyword seen in the draft's lines, else derived from the start time.
    pub fn day_part(&self) -> Option<DayPart> {
        self.day_part_hint.or_else(|| self.begin_time().map(DayPart::from_time))
    }

    /// Concrete date of the draft, placed in the year that keeps it closest
    /// to the meeting's header date.
    pub fn scheduled_date(&self, header_date: NaiveDate) -> Option<NaiveDate> {
        let day: u32 = self.day.as_deref()?.trim().parse().ok()?;
        let month = month_number(self.month.as_deref()?)?;
        let date = NaiveDate::from_ymd_opt(header_date.year(), month, day)?;
        let offset = (date - header_date).num_days();
        if offset < -60 {
            NaiveDate::from_ymd_opt(header_date.year() + 1, month, day)
        } else if offset > 300 {
            NaiveDate::from_ymd_opt(header_date.year() - 1, month, day)
        } else {
            Some(date)
        }
    }
}

/// Month number from an Italian month name or its three-letter prefix.
pub fn month_number(text: &str) -> Option<u32> {
    let lower = text.trim().to_lowercase();
    let prefix: String = lower.chars().take(3).collect();
    let month = match prefix.as_str() {
        "gen" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "mag" => 5,
        "giu" => 6,
        "lug" => 7,
        "ago" => 8,
        "set" => 9,
        "ott" => 10,
        "nov" => 11,
        "dic" => 12,
        _ => return None,
    };
    Some(month)
}

/// First clock time (`9`, `9.30`, `14:00`) found in `text`.
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let caps = regex!(r"\b([01]?\d|2[0-3])(?:[.:,h]([0-5]\d))?\b").captures(text)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn day_part_keyword(line: &str) -> Option<DayPart> {
    let caps = regex!(r"(?i)\b(mattin\w*|pomerigg\w*|ser(?:a|ale|ata))\b").captures(line)?;
    let word = caps.get(1)?.as_str().to_lowercase();
    if word.starts_with("mattin") {
        Some(DayPart::Morning)
    } else if word.starts_with("pomerigg") {
        Some(DayPart::Afternoon)
    } else {
        Some(DayPart::Evening)
    }
}

fn date_tokens(line: &str) -> (Option<String>, Option<String>) {
    match date_re().captures(line) {
        Some(caps) => (caps.get(1).map(|m| m.as_str().to_string()), caps.get(2).map(|m| m.as_str().to_string())),
        None => (None, None),
    }
}

// --- Sequential scan ----------------------------------------------------------

#[derive(Debug, Default)]
struct Scan {
    drafts: Vec<SessionDraft>,
    current: Option<SessionDraft>,
    pending_pool: Option<String>,
    order: i64,
}

impl Scan {
    fn feed(&mut self, line: &str) {
        let kind = classify(line);
        if kind.contains(LineKind::POOL_MENTION) && !kind.intersects(LineKind::INDIVIDUAL_EVENT | LineKind::RELAY_EVENT)
        {
            self.pending_pool = Some(line.to_string());
        }
        if !is_session_line(kind) {
            return;
        }

        if kind.contains(LineKind::DATE) {
            self.flush();
            let (day, month) = date_tokens(line);
            self.open(day, month);
        }

        for token in tokenize_line(line) {
            match token.kind {
                TokenKind::Time => self.on_time(token),
                TokenKind::WarmUp => {
                    let draft = self.current_mut();
                    if draft.warm_up_time.is_none() && parse_clock(&token.text).is_some() {
                        draft.warm_up_time = Some(token.text.clone());
                    }
                    draft.tokens.push(token);
                }
                TokenKind::IndividualEvent | TokenKind::RelayEvent => self.current_mut().tokens.push(token),
                TokenKind::Text => {}
            }
        }

        if let (Some(part), Some(draft)) = (day_part_keyword(line), self.current.as_mut()) {
            draft.day_part_hint.get_or_insert(part);
        }
    }

    fn on_time(&mut self, token: Token) {
        let sibling = self.current.as_ref().filter(|d| d.start_time.is_some()).map(|d| (d.day.clone(), d.month.clone()));
        if let Some((day, month)) = sibling {
            self.flush();
            self.open(day, month);
        }
        self.current_mut().start_time = Some(token.text);
    }

    fn open(&mut self, day: Option<String>, month: Option<String>) {
        self.order += 1;
        self.current = Some(SessionDraft::new(self.order, day, month));
    }

    fn current_mut(&mut self) -> &mut SessionDraft {
        let order = &mut self.order;
        self.current.get_or_insert_with(|| {
            *order += 1;
            SessionDraft::new(*order, None, None)
        })
    }

    fn flush(&mut self) {
        if let Some(mut draft) = self.current.take() {
            if let Some(pool) = self.pending_pool.take() {
                draft.pool_override = Some(pool);
            }
            self.drafts.push(draft);
        }
    }

    fn finish(mut self) -> Vec<SessionDraft> {
        self.flush();
        self.drafts
    }
}

fn merge_warm_up_drafts(drafts: &mut Vec<SessionDraft>) {
    let mut idx = 0;
    while idx < drafts.len() {
        if !drafts[idx].is_warm_up_only() {
            idx += 1;
            continue;
        }
        let warm_up = drafts.remove(idx);
        if let Some(next) = drafts.get_mut(idx) {
            if next.warm_up_time.is_none() {
                next.warm_up_time = warm_up.warm_up_time.or(warm_up.start_time);
            }
            if next.pool_override.is_none() {
                next.pool_override = warm_up.pool_override;
            }
        }
    }
}

fn dedup_events(drafts: &mut Vec<SessionDraft>) {
    let mut seen: HashSet<String> = HashSet::new();
    drafts.retain_mut(|draft| {
        draft.tokens.retain(|t| {
            if !t.kind.is_event() {
                return true;
            }
            match parse_event_token(&t.text) {
                Some(attrs) => seen.insert(attrs.code()),
                None => false,
            }
        });
        draft.has_events()
    });
}

/// Group the program text into session drafts.
pub fn extract_sessions(program: &str) -> Vec<SessionDraft> {
    let mut scan = Scan::default();
    for line in program_lines(program) {
        scan.feed(line);
    }
    let mut drafts = scan.finish();

    merge_warm_up_drafts(&mut drafts);
    dedup_events(&mut drafts);
    for (idx, draft) in drafts.iter_mut().enumerate() {
        draft.session_order = idx as i64 + 1;
    }

    tracing::debug!(drafts = drafts.len(), "sessions extracted");
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    #[test]
    fn duplicate_events_across_drafts_are_dropped() {
        let drafts = extract_sessions("28 Febbraio ore 9.00 50 SL 100 DO\r\n28 Febbraio ore 9.00 50 SL");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].event_codes(), vec!["50SL", "100DO"]);
        assert_eq!(drafts[0].day.as_deref(), Some("28"));
        assert_eq!(drafts[0].month.as_deref(), Some("Febbraio"));
        assert_eq!(drafts[0].begin_time(), time(9, 0));
    }

    #[test]
    fn second_time_under_same_date_opens_a_sibling_session() {
        let program = "Sabato 2 marzo\nore 9.00 riscaldamento\n50 SL - 100 RA\nore 15.00\n200 MI, staffetta 4x50 SL";
        let drafts = extract_sessions(program);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].event_codes(), vec!["50SL", "100RA"]);
        assert_eq!(drafts[1].event_codes(), vec!["200MI", "S4X50SL"]);
        assert_eq!(drafts[1].day.as_deref(), Some("2"));
        assert_eq!(drafts[1].day_part(), Some(DayPart::Afternoon));
        assert_eq!((drafts[0].session_order, drafts[1].session_order), (1, 2));
    }

    #[test]
    fn warm_up_only_drafts_merge_into_the_next_one() {
        let program = "Domenica 3 marzo\nRiscaldamento:\nore 8.00\nore 9.00\n400 SL\n800 SL";
        let drafts = extract_sessions(program);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].warm_up(), time(8, 0));
        assert_eq!(drafts[0].begin_time(), time(9, 0));
        assert_eq!(drafts[0].event_codes(), vec!["400SL", "800SL"]);
    }

    #[test]
    fn warm_up_with_time_fills_the_warm_up_slot() {
        let drafts = extract_sessions("10 dicembre mattina\nRiscaldamento ore 8.15 - inizio gare ore 9.00\n100 farfalla");
        assert_eq!(drafts[0].warm_up(), time(8, 15));
        assert_eq!(drafts[0].begin_time(), time(9, 0));
        assert_eq!(drafts[0].day_part(), Some(DayPart::Morning));
    }

    #[test]
    fn pool_mention_attaches_to_the_draft_being_flushed() {
        let program = "Sabato 24 febbraio ore 15.00\n50 DO\nPiscina Comunale di Modena, vasca 25 mt\nDomenica 25 febbraio ore 9.00\n50 RA";
        let drafts = extract_sessions(program);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].pool_override.as_deref(), Some("Piscina Comunale di Modena, vasca 25 mt"));
        assert_eq!(drafts[1].pool_override, None);
    }

    #[test]
    fn deadline_lines_do_not_redate_the_session() {
        let drafts = extract_sessions("Sabato 2 marzo\nIscrizioni entro il 20 febbraio\nore 9.00 50 SL, 100 RA");
        assert_eq!(drafts.len(), 1);
        assert_eq!((drafts[0].day.as_deref(), drafts[0].month.as_deref()), (Some("2"), Some("marzo")));
        assert_eq!(drafts[0].event_codes(), vec!["50SL", "100RA"]);
    }

    #[test]
    fn drafts_without_events_are_dropped() {
        assert!(extract_sessions("Sabato 24 febbraio\nore 9.00\nNota: premiazioni al termine").is_empty());
        assert!(extract_sessions("").is_empty());
    }

    #[test]
    fn scheduled_date_rolls_over_the_new_year() {
        let header = NaiveDate::from_ymd_opt(2023, 12, 30).unwrap();
        let draft = SessionDraft { day: Some("1".into()), month: Some("gennaio".into()), ..SessionDraft::default() };
        assert_eq!(draft.scheduled_date(header), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn clock_parsing_accepts_common_forms() {
        assert_eq!(parse_clock("ore 9"), time(9, 0));
        assert_eq!(parse_clock("Riscaldamento ore 8.30"), time(8, 30));
        assert_eq!(parse_clock("h 14:45"), time(14, 45));
        assert_eq!(parse_clock("nessun orario"), None);
    }
}
