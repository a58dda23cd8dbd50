//! Event-type attributes parsed from a single event token.

use super::tokenizer::{individual_event_re, relay_event_re};
use crate::model::{EventType, Stroke};
use crate::store::{Criteria, Repository, RepositoryResult};

/// What a token says about the event, before any repository lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTypeAttrs {
    pub is_relay: bool,
    pub is_mixed_gender: bool,
    pub stroke: Stroke,
    /// Distance swum by each athlete.
    pub phase_length: u32,
    /// 1 for individual events, 4 or 8 for relays.
    pub phases: u32,
}

impl EventTypeAttrs {
    pub fn total_length(&self) -> u32 {
        self.phases * self.phase_length
    }

    /// `"50SL"` for individual events, `"S4X50SL"` / `"M4X50MI"` for relays.
    pub fn code(&self) -> String {
        if self.is_relay {
            let prefix = if self.is_mixed_gender { "M" } else { "S" };
            format!("{prefix}{}X{}{}", self.phases, self.phase_length, self.stroke.code())
        } else {
            format!("{}{}", self.phase_length, self.stroke.code())
        }
    }
}

fn stroke_from_text(text: &str) -> Option<Stroke> {
    let word = text.trim().to_lowercase();
    let stroke = match word.as_str() {
        w if w.starts_with("stile") || w == "sl" => Stroke::Freestyle,
        "dorso" | "do" => Stroke::Backstroke,
        "rana" | "ra" => Stroke::Breaststroke,
        "farfalla" | "delfino" | "fa" | "dl" => Stroke::Butterfly,
        "misti" | "mista" | "mi" => Stroke::Medley,
        _ => return None,
    };
    Some(stroke)
}

/// Attributes of a relay or individual event token. Relays are checked first
/// since their text embeds an individual distance.
pub fn parse_event_token(token: &str) -> Option<EventTypeAttrs> {
    if let Some(caps) = relay_event_re().captures(token) {
        let keyword = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let stroke = match caps.get(5) {
            Some(m) => stroke_from_text(m.as_str())?,
            None if caps.get(2).is_some() => Stroke::Medley,
            None => Stroke::Freestyle,
        };
        return Some(EventTypeAttrs {
            is_relay: true,
            is_mixed_gender: keyword.starts_with("mistaff"),
            stroke,
            phase_length: caps.get(4)?.as_str().parse().ok()?,
            phases: caps.get(3)?.as_str().parse().ok()?,
        });
    }

    let caps = individual_event_re().captures(token)?;
    Some(EventTypeAttrs {
        is_relay: false,
        is_mixed_gender: false,
        stroke: stroke_from_text(caps.get(2)?.as_str())?,
        phase_length: caps.get(1)?.as_str().parse().ok()?,
        phases: 1,
    })
}

/// An event type that is not in the repository yet, ready to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTypeDescriptor {
    pub code: String,
    pub attrs: EventTypeAttrs,
}

impl EventTypeDescriptor {
    pub fn new(attrs: EventTypeAttrs) -> Self {
        EventTypeDescriptor { code: attrs.code(), attrs }
    }

    pub fn to_event_type(&self) -> EventType {
        EventType {
            id: None,
            code: self.code.clone(),
            stroke: self.attrs.stroke,
            length_in_meters: self.attrs.total_length(),
            phases: self.attrs.phases,
            phase_length_in_meters: self.attrs.phase_length,
            is_relay: self.attrs.is_relay,
            is_mixed_gender: self.attrs.is_mixed_gender,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventTypeLookup {
    Found(EventType),
    Missing(EventTypeDescriptor),
}

/// Look up the event type matching every attribute exactly.
pub fn resolve_event_type<R: Repository>(store: &R, attrs: &EventTypeAttrs) -> RepositoryResult<EventTypeLookup> {
    let criteria = Criteria::new()
        .eq("stroke", attrs.stroke.code())
        .eq("length_in_meters", attrs.total_length())
        .eq("phases", attrs.phases)
        .eq("phase_length_in_meters", attrs.phase_length)
        .eq("is_relay", attrs.is_relay)
        .eq("is_mixed_gender", attrs.is_mixed_gender);

    Ok(match store.find_one::<EventType>(&criteria)? {
        Some(found) => EventTypeLookup::Found(found),
        None => EventTypeLookup::Missing(EventTypeDescriptor::new(*attrs)),
    })
}
