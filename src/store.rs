//! Persistence abstraction.
//!
//! Resolvers never talk to a database directly. Everything goes through the
//! [`Repository`] trait, which exposes these operations:
//!
//! ```text
//! find_many(criteria) ──▶ Vec<E>        (ordered by id)
//! find_one(criteria)  ──▶ Option<E>     (first of find_many)
//! save(&mut E)        ──▶ SaveOutcome   (insert or update, assigns ids)
//! delete_with_audit   ──▶ AuditRecord   (the equivalent DELETE statement)
//! next_id             ──▶ i64           (id the next insert would receive)
//! ```
//!
//! Criteria are plain field-equality or case-insensitive substring filters
//! (see `criteria.rs`). There are no implicit scopes: callers compose the named
//! predicate helpers in [`criteria`] explicitly.
//!
//! ## Modules
//!
//! - `value.rs`: column values, rows and their SQL literal rendering.
//! - `criteria.rs`: filters and named predicates.
//! - `memory.rs`: the in-memory repository used by tests and dry runs.
//! - `allocator.rs`: reserved-range allocator for new meeting ids.

#[path = "store/allocator.rs"]
mod allocator;
#[path = "store/criteria.rs"]
pub mod criteria;
#[path = "store/memory.rs"]
mod memory;
#[path = "store/value.rs"]
mod value;

pub use allocator::{MeetingIdAllocator, ReservedRangeAllocator, federation_offset};
pub use criteria::{Criteria, Filter, FilterOp};
pub use memory::MemoryStore;
pub use value::{Row, Value};

use chrono::NaiveDateTime;

/// A persisted record type.
pub trait Entity: Clone + std::fmt::Debug + 'static {
    /// Table name used for SQL rendering and storage bucketing.
    const TABLE: &'static str;

    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);

    /// All columns, `id` first.
    fn to_row(&self) -> Row;

    /// Constraint checks run by `save`. An empty list means valid.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    fn updated_at(&self) -> Option<NaiveDateTime> {
        None
    }

    fn touch(&mut self, _at: NaiveDateTime) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
}

/// Statement equivalent to a delete that was performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub table: &'static str,
    pub id: i64,
    pub sql: String,
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Not found: {entity} id={id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Save rejected by entity constraints.
    #[error("Validation failed for {entity}: {}", messages.join("; "))]
    Validation { entity: &'static str, messages: Vec<String> },

    #[error("Conflict on {entity}: {message}")]
    Conflict { entity: &'static str, message: String },

    #[error("Backend error: {0}")]
    Backend(String),
}

pub trait Repository {
    fn find_many<E: Entity>(&self, criteria: &Criteria) -> RepositoryResult<Vec<E>>;

    fn find_one<E: Entity>(&self, criteria: &Criteria) -> RepositoryResult<Option<E>> {
        Ok(self.find_many::<E>(criteria)?.into_iter().next())
    }

    fn find_by_id<E: Entity>(&self, id: i64) -> RepositoryResult<Option<E>> {
        self.find_one::<E>(&Criteria::new().eq("id", id))
    }

    /// Insert when the entity has no id (or an id unknown to the store),
    /// update otherwise. Assigns the id on insert.
    fn save<E: Entity>(&mut self, entity: &mut E) -> RepositoryResult<SaveOutcome>;

    /// Id the next insert of `E` would receive.
    fn next_id<E: Entity>(&self) -> RepositoryResult<i64>;

    /// Delete the row and return the statement that reproduces the delete.
    fn delete_with_audit<E: Entity>(&mut self, entity: &E) -> RepositoryResult<AuditRecord>;
}
