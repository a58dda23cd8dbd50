//! Line classification and token splitting.
//!
//! Every category has its own independent matcher. The `regex` crate has no
//! look-around, so the exclusions the grammar needs (a pool length is not an
//! event, a dotted date is not a time) are post-match checks on the text
//! around the match.

use crate::{Token, TokenKind};
use regex::Regex;

bitflags::bitflags! {
    /// Categories detected on a single program line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LineKind: u16 {
        const DATE             = 1 << 0;
        const TIME             = 1 << 1;
        const STYLE            = 1 << 2;
        const INDIVIDUAL_EVENT = 1 << 3;
        const RELAY_EVENT      = 1 << 4;
        const WARMUP           = 1 << 5;
        const FOOTNOTE         = 1 << 6;
        const NOISE            = 1 << 7;
        const POOL_MENTION     = 1 << 8;

        /// Lines worth keeping for session extraction.
        const INTERESTING = Self::DATE.bits()
            | Self::TIME.bits()
            | Self::STYLE.bits()
            | Self::RELAY_EVENT.bits()
            | Self::WARMUP.bits();
    }
}

// --- Matchers ---------------------------------------------------------------

pub(crate) fn date_re() -> &'static Regex {
    regex!(
        r"(?i)\b(\d{1,2})\s*(?:[-/.]\s*)?(gen(?:naio)?|feb(?:braio)?|mar(?:zo)?|apr(?:ile)?|mag(?:gio)?|giu(?:gno)?|lug(?:lio)?|ago(?:sto)?|set(?:tembre)?|ott(?:obre)?|nov(?:embre)?|dic(?:embre)?)\b"
    )
}

pub(crate) fn time_re() -> &'static Regex {
    regex!(r"(?i)\b(?:ore|h)\.?\s*([01]?\d|2[0-3])(?:[.:,]([0-5]\d))?\b|\b([01]?\d|2[0-3])[.:]([0-5]\d)\b")
}

pub(crate) fn style_re() -> &'static Regex {
    regex!(r"(?i)\b(stile\s+libero|dorso|rana|farfalla|delfino|misti|mista|staffett[ae]|mistaffett[ae])\b")
}

pub(crate) fn individual_event_re() -> &'static Regex {
    regex!(
        r"(?i)\b(50|100|200|400|800|1500)\s*(?:m|mt|metri)?\.?\s*(stile\s+libero|stile|dorso|rana|farfalla|delfino|misti|sl|do|ra|fa|mi|dl)\b"
    )
}

pub(crate) fn relay_event_re() -> &'static Regex {
    regex!(
        r"(?i)(?:\b(mistaffetta|staffetta|staff\.?)\s*(mista\s*)?)?\b([48])\s*x\s*(50|100|200)\s*(?:m|mt|metri)?\.?\s*(stile\s+libero|stile|misti|mista|sl|mi)?\b"
    )
}

pub(crate) fn warm_up_re() -> &'static Regex {
    regex!(
        r"(?i)\b(?:riscaldamento|risc\.)(?:\s*:?\s*(?:dalle\s+)?(?:ore|h)?\.?\s*([01]?\d|2[0-3])[.:]([0-5]\d))?"
    )
}

fn footnote_re() -> &'static Regex {
    regex!(r"(?i)^\s*(?:\*|\(\d\)|nota\b|note\b|n\.\s?b\.)")
}

fn noise_re() -> &'static Regex {
    regex!(
        r"(?i)\b(iscrizion[ei]|premiazion[ei]|tassa|quota|cronometraggio|regolamento|info\b|informazion[ei]|tel\b|e-?mail|www\.|http)"
    )
}

pub(crate) fn pool_mention_re() -> &'static Regex {
    regex!(r"(?i)\b(piscin[ae]|vasca|impianto|centro\s+natatorio|stadio\s+del\s+nuoto|polo\s+natatorio)\b")
}

/// Text right before a number that makes it a pool length rather than an
/// event distance ("vasca 50", "piscina comunale da 50").
fn pool_selector_re() -> &'static Regex {
    regex!(r"(?i)(?:vasca|piscina|impianto|corsie)(?:\s+\w+)?\s*(?:da\s*)?$")
}

fn quoted_re() -> &'static Regex {
    regex!(r#""[^"]*"|“[^”]*”"#)
}

fn separator_re() -> &'static Regex {
    regex!(r"^[\s,;:\-–/+.()*]*$")
}

// --- Classification ---------------------------------------------------------

pub(crate) fn is_pool_selector(line: &str, start: usize) -> bool {
    pool_selector_re().is_match(&line[..start])
}

/// A time followed by `.dd` or `/dd` is the head of a dotted date.
fn is_date_like(line: &str, end: usize) -> bool {
    let rest = line[end..].as_bytes();
    rest.len() >= 2 && matches!(rest[0], b'.' | b'/') && rest[1].is_ascii_digit()
}

fn individual_events(line: &str) -> impl Iterator<Item = regex::Match<'_>> + '_ {
    individual_event_re().find_iter(line).filter(move |m| !is_pool_selector(line, m.start()))
}

fn times(line: &str) -> impl Iterator<Item = regex::Match<'_>> + '_ {
    time_re().find_iter(line).filter(move |m| !is_date_like(line, m.end()))
}

/// Classify a single line.
pub fn classify(line: &str) -> LineKind {
    let mut kind = LineKind::empty();

    if date_re().is_match(line) {
        kind |= LineKind::DATE;
    }
    if times(line).next().is_some() {
        kind |= LineKind::TIME;
    }
    let has_individual = individual_events(line).next().is_some();
    if has_individual {
        kind |= LineKind::INDIVIDUAL_EVENT;
    }
    let has_relay = relay_event_re().is_match(line);
    if has_relay {
        kind |= LineKind::RELAY_EVENT;
    }
    if has_individual || has_relay || style_re().is_match(line) {
        kind |= LineKind::STYLE;
    }
    if warm_up_re().is_match(line) {
        kind |= LineKind::WARMUP;
    }
    if footnote_re().is_match(line) {
        kind |= LineKind::FOOTNOTE;
    }
    if pool_mention_re().is_match(line) {
        kind |= LineKind::POOL_MENTION;
    }
    if noise_re().is_match(line) || (!kind.intersects(LineKind::INTERESTING) && !kind.contains(LineKind::POOL_MENTION))
    {
        kind |= LineKind::NOISE;
    }

    tracing::trace!(line, ?kind, "classified");
    kind
}

/// Lines that can open or feed a session. A noise line (entry deadline, prize
/// giving) only counts when it also carries a time or an event.
pub(crate) fn is_session_line(kind: LineKind) -> bool {
    kind.intersects(LineKind::INTERESTING)
        && (!kind.contains(LineKind::NOISE)
            || kind.intersects(LineKind::TIME | LineKind::INDIVIDUAL_EVENT | LineKind::RELAY_EVENT))
}

/// Non-empty, carriage-return free lines of `text`.
pub(crate) fn program_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.trim_end_matches('\r').trim()).filter(|l| !l.is_empty())
}

/// Lines that carry at least one interesting category and are not notes.
pub fn filter_program_lines(text: &str) -> Vec<String> {
    program_lines(text).filter(|l| is_session_line(classify(l))).map(str::to_string).collect()
}

// --- Token splitting --------------------------------------------------------

/// Cut `line` into atomic tokens at time / event / relay / warm-up matches.
///
/// Overlaps are resolved earliest-first, then longest-first. Matches that
/// start inside a quoted substring are ignored. Text between matches is kept
/// as a `Text` token unless it is only separators.
pub fn tokenize_line(line: &str) -> Vec<Token> {
    let quoted: Vec<(usize, usize)> = quoted_re().find_iter(line).map(|m| (m.start(), m.end())).collect();
    let in_quotes = |pos: usize| quoted.iter().any(|(s, e)| pos > *s && pos < *e);

    let mut candidates: Vec<(usize, usize, TokenKind)> = Vec::new();
    candidates.extend(warm_up_re().find_iter(line).map(|m| (m.start(), m.end(), TokenKind::WarmUp)));
    candidates.extend(relay_event_re().find_iter(line).map(|m| (m.start(), m.end(), TokenKind::RelayEvent)));
    candidates.extend(individual_events(line).map(|m| (m.start(), m.end(), TokenKind::IndividualEvent)));
    candidates.extend(times(line).map(|m| (m.start(), m.end(), TokenKind::Time)));
    candidates.retain(|(start, _, _)| !in_quotes(*start));
    candidates.sort_by_key(|(start, end, _)| (*start, std::cmp::Reverse(*end)));

    let mut tokens = Vec::new();
    let mut cursor = 0;
    for (start, end, kind) in candidates {
        if start < cursor {
            continue;
        }
        push_text(&mut tokens, line, cursor, start);
        tokens.push(Token::new(kind, &line[start..end], start, end));
        cursor = end;
    }
    push_text(&mut tokens, line, cursor, line.len());
    tokens
}

fn is_edge_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-' | '–' | '/' | '+' | '.' | '*')
}

/// Push the remainder `line[start..end]` as a `Text` token, without the
/// separators around it. Pure-separator remainders are dropped.
fn push_text(tokens: &mut Vec<Token>, line: &str, start: usize, end: usize) {
    if start >= end || separator_re().is_match(&line[start..end]) {
        return;
    }
    let raw = &line[start..end];
    let head = raw.trim_start_matches(is_edge_separator);
    let text = head.trim_end_matches(is_edge_separator);
    let from = start + (raw.len() - head.len());
    tokens.push(Token::new(TokenKind::Text, text, from, from + text.len()));
}

/// String form of [`tokenize_line`].
pub fn split_event_line_into_tokens(line: &str) -> Vec<String> {
    tokenize_line(line).into_iter().map(|t| t.text).collect()
}
