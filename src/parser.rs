//! Program-text parsing.
//!
//! A calendar row's program is hand-written Italian prose. Parsing it is a
//! three-step pipeline:
//!
//! ```text
//! program text
//!    │  tokenizer::filter_program_lines     (drop blank / uninteresting lines)
//!    │  tokenizer::classify                 (LineKind bit set per line)
//!    │  tokenizer::tokenize_line            (cut lines at time / event / warm-up matches)
//!    v
//! sessions::extract_sessions               (group tokens into SessionDrafts,
//!    │                                       merge warm-up drafts, dedup events)
//!    v
//! event_type::parse_event_token            (token ─▶ EventTypeAttrs ─▶ code)
//! event_type::resolve_event_type           (attrs ─▶ EventType | descriptor)
//! ```
//!
//! The whole pipeline is pure except for `resolve_event_type`, which reads the
//! repository.
//!
//! ## Debugging
//!
//! Run with `RUST_LOG=fincal::parser=trace` to see per-line classification.

#[path = "parser/event_type.rs"]
pub mod event_type;
#[path = "parser/sessions.rs"]
pub mod sessions;
#[path = "parser/tokenizer.rs"]
pub mod tokenizer;

pub use event_type::{EventTypeAttrs, EventTypeDescriptor, EventTypeLookup, parse_event_token, resolve_event_type};
pub use sessions::{SessionDraft, extract_sessions};
pub use tokenizer::{LineKind, classify, filter_program_lines, split_event_line_into_tokens, tokenize_line};
