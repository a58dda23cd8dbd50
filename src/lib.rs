//! Calendar synchronization for masters swimming meetings.
//!
//! The crate turns the loosely structured program text published with each
//! federation calendar row into session drafts, then reconciles those drafts
//! against a repository of meetings, sessions, events, pools and cities.
//!
//! ```text
//! program text ── parser::tokenizer ── parser::sessions ── Vec<SessionDraft>
//!                                                             │
//! calendar feed ── reconciler ──┬─ MeetingResolver            │
//!                               ├─ PoolResolver (CityResolver)◀┘
//!                               ├─ SessionResolver
//!                               └─ EventResolver ── DiffLog
//! ```

#[macro_use]
mod macros;
mod api;
pub mod audit;
mod error;
pub mod fuzzy;
pub mod geocode;
pub mod model;
pub mod parser;
pub mod reconciler;
pub mod resolvers;
pub mod store;

pub use api::{Context, Options, extract_sessions, filter_program_lines, reconcile};
pub use audit::DiffLog;
pub use error::{Error, Result};
pub use parser::sessions::SessionDraft;
pub use reconciler::{CalendarReconciler, EntryError, EntryOutcome, RunReport};

// --- Shared token types -----------------------------------------------------

/// Category of an atomic program token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Time,
    IndividualEvent,
    RelayEvent,
    WarmUp,
    /// Remainder between two matches that is not a pure separator.
    Text,
}

impl TokenKind {
    pub fn is_event(self) -> bool {
        matches!(self, TokenKind::IndividualEvent | TokenKind::RelayEvent)
    }
}

/// Byte span into the line a token was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// Start byte index (inclusive).
    pub start: usize,
    /// End byte index (exclusive).
    pub end: usize,
}

/// An atomic piece of a program line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub range: Range,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, text: &str, start: usize, end: usize) -> Self {
        Token { kind, text: text.trim().to_string(), range: Range { start, end } }
    }
}
