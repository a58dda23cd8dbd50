//! Entities and the small enumerations attached to them.

use crate::store::{Entity, Row};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

// --- Enumerations -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stroke {
    #[default]
    Freestyle,
    Backstroke,
    Breaststroke,
    Butterfly,
    Medley,
}

impl Stroke {
    pub fn code(self) -> &'static str {
        match self {
            Stroke::Freestyle => "SL",
            Stroke::Backstroke => "DO",
            Stroke::Breaststroke => "RA",
            Stroke::Butterfly => "FA",
            Stroke::Medley => "MI",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "SL" => Some(Stroke::Freestyle),
            "DO" => Some(Stroke::Backstroke),
            "RA" => Some(Stroke::Breaststroke),
            "FA" => Some(Stroke::Butterfly),
            "MI" => Some(Stroke::Medley),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PoolType {
    #[default]
    Metres25,
    Metres50,
}

impl PoolType {
    pub fn code(self) -> &'static str {
        match self {
            PoolType::Metres25 => "25",
            PoolType::Metres50 => "50",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "25" => Some(PoolType::Metres25),
            "50" => Some(PoolType::Metres50),
            _ => None,
        }
    }

    /// The other standard pool length.
    pub fn alternate(self) -> Self {
        match self {
            PoolType::Metres25 => PoolType::Metres50,
            PoolType::Metres50 => PoolType::Metres25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayPart {
    Morning,
    Afternoon,
    Evening,
}

impl DayPart {
    pub fn code(self) -> &'static str {
        match self {
            DayPart::Morning => "M",
            DayPart::Afternoon => "P",
            DayPart::Evening => "S",
        }
    }

    pub fn from_time(time: NaiveTime) -> Self {
        match time.hour() {
            0..=12 => DayPart::Morning,
            13..=18 => DayPart::Afternoon,
            _ => DayPart::Evening,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditionType {
    #[default]
    None,
    Ordinal,
    Roman,
    Yearly,
}

impl EditionType {
    pub fn code(self) -> &'static str {
        match self {
            EditionType::None => "none",
            EditionType::Ordinal => "ordinal",
            EditionType::Roman => "roman",
            EditionType::Yearly => "yearly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingType {
    Manual,
    SemiAutomatic,
    #[default]
    Automatic,
}

impl TimingType {
    pub fn code(self) -> &'static str {
        match self {
            TimingType::Manual => "manual",
            TimingType::SemiAutomatic => "semi-automatic",
            TimingType::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeatType {
    #[default]
    Finals,
    Heats,
}

impl HeatType {
    pub fn code(self) -> &'static str {
        match self {
            HeatType::Finals => "F",
            HeatType::Heats => "B",
        }
    }
}

// --- Entities ---------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Season {
    pub id: Option<i64>,
    /// Display years, e.g. `"2023/2024"`.
    pub header_year: String,
    pub begin_date: NaiveDate,
    pub end_date: NaiveDate,
    pub federation_code: String,
}

impl Season {
    /// Season running from October of `begin_year` to September of the next year.
    pub fn starting(id: i64, begin_year: i32, federation_code: &str) -> Option<Self> {
        Some(Season {
            id: Some(id),
            header_year: format!("{}/{}", begin_year, begin_year + 1),
            begin_date: NaiveDate::from_ymd_opt(begin_year, 10, 1)?,
            end_date: NaiveDate::from_ymd_opt(begin_year + 1, 9, 30)?,
            federation_code: federation_code.to_string(),
        })
    }
}

/// One row of the federation's published calendar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarEntry {
    pub id: Option<i64>,
    pub season_id: i64,
    /// External meeting code, unique per season.
    pub meeting_code: String,
    pub name: String,
    pub place: String,
    /// Day or day range, e.g. `"24-25"`.
    pub dates: String,
    pub month: String,
    pub year: String,
    pub program: String,
    pub organization: String,
    pub name_import: String,
    pub manifest_link: String,
    pub startlist_link: String,
    pub results_link: String,
    pub cancelled: bool,
    pub meeting_id: Option<i64>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meeting {
    pub id: Option<i64>,
    pub season_id: i64,
    pub code: String,
    pub description: String,
    pub header_date: NaiveDate,
    pub header_year: String,
    pub edition: u32,
    pub edition_type: EditionType,
    pub timing_type: TimingType,
    pub confirmed: bool,
    pub cancelled: bool,
    pub results_acquired: bool,
    pub do_not_update: bool,
    pub entry_deadline: Option<NaiveDate>,
    pub invitation: String,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeetingSession {
    pub id: Option<i64>,
    pub meeting_id: i64,
    pub session_order: i64,
    pub scheduled_date: NaiveDate,
    pub begin_time: Option<NaiveTime>,
    pub warm_up_time: Option<NaiveTime>,
    pub swimming_pool_id: Option<i64>,
    pub day_part: Option<DayPart>,
    pub description: String,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeetingEvent {
    pub id: Option<i64>,
    pub meeting_session_id: i64,
    pub event_type_id: i64,
    pub event_order: i64,
    pub heat_type: HeatType,
    pub out_of_race: bool,
    pub begin_time: Option<NaiveTime>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventType {
    pub id: Option<i64>,
    pub code: String,
    pub stroke: Stroke,
    pub length_in_meters: u32,
    pub phases: u32,
    pub phase_length_in_meters: u32,
    pub is_relay: bool,
    pub is_mixed_gender: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct City {
    pub id: Option<i64>,
    pub name: String,
    pub zip: String,
    pub area: String,
    pub area_type: String,
    pub country: String,
    pub country_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwimmingPool {
    pub id: Option<i64>,
    pub name: String,
    /// Normalized `city + name + pool type` key, at most 40 chars.
    pub nick_name: String,
    pub pool_type: PoolType,
    pub lanes: Option<u32>,
    pub address: String,
    pub city_id: Option<i64>,
    pub maps_uri: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: String,
    /// Manual override: automated syncs must not touch this row.
    pub read_only: bool,
    pub updated_at: Option<NaiveDateTime>,
}

// --- Entity impls -----------------------------------------------------------

fn required(messages: &mut Vec<String>, column: &str, value: &str) {
    if value.trim().is_empty() {
        messages.push(format!("{column} can't be blank"));
    }
}

impl Entity for Season {
    const TABLE: &'static str = "seasons";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("header_year", &self.header_year)
            .with("begin_date", self.begin_date)
            .with("end_date", self.end_date)
            .with("federation_code", &self.federation_code)
    }
}

impl Entity for CalendarEntry {
    const TABLE: &'static str = "calendars";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("season_id", self.season_id)
            .with("meeting_code", &self.meeting_code)
            .with("name", &self.name)
            .with("place", &self.place)
            .with("dates", &self.dates)
            .with("month", &self.month)
            .with("year", &self.year)
            .with("program", &self.program)
            .with("organization", &self.organization)
            .with("name_import", &self.name_import)
            .with("manifest_link", &self.manifest_link)
            .with("startlist_link", &self.startlist_link)
            .with("results_link", &self.results_link)
            .with("cancelled", self.cancelled)
            .with("meeting_id", self.meeting_id)
            .with("updated_at", self.updated_at)
    }

    fn validate(&self) -> Vec<String> {
        let mut messages = Vec::new();
        required(&mut messages, "meeting_code", &self.meeting_code);
        messages
    }

    fn updated_at(&self) -> Option<NaiveDateTime> {
        self.updated_at
    }

    fn touch(&mut self, at: NaiveDateTime) {
        self.updated_at = Some(at);
    }
}

impl Entity for Meeting {
    const TABLE: &'static str = "meetings";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("season_id", self.season_id)
            .with("code", &self.code)
            .with("description", &self.description)
            .with("header_date", self.header_date)
            .with("header_year", &self.header_year)
            .with("edition", self.edition)
            .with("edition_type", self.edition_type.code())
            .with("timing_type", self.timing_type.code())
            .with("confirmed", self.confirmed)
            .with("cancelled", self.cancelled)
            .with("results_acquired", self.results_acquired)
            .with("do_not_update", self.do_not_update)
            .with("entry_deadline", self.entry_deadline)
            .with("invitation", &self.invitation)
            .with("updated_at", self.updated_at)
    }

    fn validate(&self) -> Vec<String> {
        let mut messages = Vec::new();
        required(&mut messages, "code", &self.code);
        required(&mut messages, "description", &self.description);
        messages
    }

    fn updated_at(&self) -> Option<NaiveDateTime> {
        self.updated_at
    }

    fn touch(&mut self, at: NaiveDateTime) {
        self.updated_at = Some(at);
    }
}

impl Entity for MeetingSession {
    const TABLE: &'static str = "meeting_sessions";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("meeting_id", self.meeting_id)
            .with("session_order", self.session_order)
            .with("scheduled_date", self.scheduled_date)
            .with("begin_time", self.begin_time)
            .with("warm_up_time", self.warm_up_time)
            .with("swimming_pool_id", self.swimming_pool_id)
            .with("day_part", self.day_part.map(DayPart::code))
            .with("description", &self.description)
            .with("updated_at", self.updated_at)
    }

    fn validate(&self) -> Vec<String> {
        if self.meeting_id <= 0 { vec!["meeting_id must reference a meeting".to_string()] } else { Vec::new() }
    }

    fn updated_at(&self) -> Option<NaiveDateTime> {
        self.updated_at
    }

    fn touch(&mut self, at: NaiveDateTime) {
        self.updated_at = Some(at);
    }
}

impl Entity for MeetingEvent {
    const TABLE: &'static str = "meeting_events";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("meeting_session_id", self.meeting_session_id)
            .with("event_type_id", self.event_type_id)
            .with("event_order", self.event_order)
            .with("heat_type", self.heat_type.code())
            .with("out_of_race", self.out_of_race)
            .with("begin_time", self.begin_time)
            .with("updated_at", self.updated_at)
    }

    fn validate(&self) -> Vec<String> {
        let mut messages = Vec::new();
        if self.meeting_session_id <= 0 {
            messages.push("meeting_session_id must reference a session".to_string());
        }
        if self.event_type_id <= 0 {
            messages.push("event_type_id must reference an event type".to_string());
        }
        messages
    }

    fn updated_at(&self) -> Option<NaiveDateTime> {
        self.updated_at
    }

    fn touch(&mut self, at: NaiveDateTime) {
        self.updated_at = Some(at);
    }
}

impl Entity for EventType {
    const TABLE: &'static str = "event_types";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("code", &self.code)
            .with("stroke", self.stroke.code())
            .with("length_in_meters", self.length_in_meters)
            .with("phases", self.phases)
            .with("phase_length_in_meters", self.phase_length_in_meters)
            .with("is_relay", self.is_relay)
            .with("is_mixed_gender", self.is_mixed_gender)
    }

    fn validate(&self) -> Vec<String> {
        let mut messages = Vec::new();
        required(&mut messages, "code", &self.code);
        if self.length_in_meters != self.phases * self.phase_length_in_meters {
            messages.push("length_in_meters must equal phases * phase_length_in_meters".to_string());
        }
        messages
    }
}

impl Entity for City {
    const TABLE: &'static str = "cities";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("name", &self.name)
            .with("zip", &self.zip)
            .with("area", &self.area)
            .with("area_type", &self.area_type)
            .with("country", &self.country)
            .with("country_code", &self.country_code)
            .with("latitude", self.latitude)
            .with("longitude", self.longitude)
            .with("updated_at", self.updated_at)
    }

    fn validate(&self) -> Vec<String> {
        let mut messages = Vec::new();
        required(&mut messages, "name", &self.name);
        messages
    }

    fn updated_at(&self) -> Option<NaiveDateTime> {
        self.updated_at
    }

    fn touch(&mut self, at: NaiveDateTime) {
        self.updated_at = Some(at);
    }
}

impl Entity for SwimmingPool {
    const TABLE: &'static str = "swimming_pools";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("name", &self.name)
            .with("nick_name", &self.nick_name)
            .with("pool_type", self.pool_type.code())
            .with("lanes", self.lanes)
            .with("address", &self.address)
            .with("city_id", self.city_id)
            .with("maps_uri", &self.maps_uri)
            .with("latitude", self.latitude)
            .with("longitude", self.longitude)
            .with("notes", &self.notes)
            .with("read_only", self.read_only)
            .with("updated_at", self.updated_at)
    }

    fn validate(&self) -> Vec<String> {
        let mut messages = Vec::new();
        required(&mut messages, "name", &self.name);
        if self.nick_name.chars().count() > 40 {
            messages.push("nick_name is too long (maximum is 40 characters)".to_string());
        }
        messages
    }

    fn updated_at(&self) -> Option<NaiveDateTime> {
        self.updated_at
    }

    fn touch(&mut self, at: NaiveDateTime) {
        self.updated_at = Some(at);
    }
}

/// Header date for a meeting from a calendar row's `dates`/`month`/`year`
/// columns. Ranges like `"24-25"` resolve to their first day.
pub fn calendar_header_date(entry: &CalendarEntry, season: &Season) -> Option<NaiveDate> {
    let day: u32 = entry.dates.trim().split(|c: char| !c.is_ascii_digit()).find(|s| !s.is_empty())?.parse().ok()?;
    let month = crate::parser::sessions::month_number(&entry.month)
        .or_else(|| entry.month.trim().parse::<u32>().ok().filter(|m| (1..=12).contains(m)))?;
    let year = entry.year.trim().parse::<i32>().ok().unwrap_or_else(|| {
        if month >= season.begin_date.month() { season.begin_date.year() } else { season.end_date.year() }
    });
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_date_uses_first_day_of_range_and_season_year() {
        let season = Season::starting(232, 2023, "FIN").unwrap();
        let entry = CalendarEntry { dates: "24-25".into(), month: "Febbraio".into(), ..CalendarEntry::default() };
        assert_eq!(calendar_header_date(&entry, &season), NaiveDate::from_ymd_opt(2024, 2, 24));

        let entry = CalendarEntry { dates: "3".into(), month: "dic".into(), ..CalendarEntry::default() };
        assert_eq!(calendar_header_date(&entry, &season), NaiveDate::from_ymd_opt(2023, 12, 3));
    }

    #[test]
    fn day_part_boundaries() {
        let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
        assert_eq!(DayPart::from_time(t(9)), DayPart::Morning);
        assert_eq!(DayPart::from_time(t(15)), DayPart::Afternoon);
        assert_eq!(DayPart::from_time(t(20)), DayPart::Evening);
    }
}
