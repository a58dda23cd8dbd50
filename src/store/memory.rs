//! In-memory repository.
//!
//! Each table is a `BTreeMap<i64, E>` stored behind `dyn Any`, keyed by
//! `E::TABLE`, so `find_many` always returns rows ordered by id.

use super::{AuditRecord, Criteria, Entity, Repository, RepositoryError, RepositoryResult, SaveOutcome};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
pub struct MemoryStore {
    tables: HashMap<&'static str, Box<dyn Any>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("tables", &self.tables.keys().collect::<Vec<_>>()).finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entity` without validation and return it with its id set.
    /// Meant for seeding fixtures; an explicit id already in use is a conflict.
    pub fn seed<E: Entity>(&mut self, mut entity: E) -> RepositoryResult<E> {
        let table = self.table_mut::<E>()?;
        let id = entity.id().unwrap_or_else(|| next_id(table));
        if table.contains_key(&id) {
            return Err(RepositoryError::Conflict { entity: E::TABLE, message: format!("id {id} already seeded") });
        }
        entity.set_id(id);
        table.insert(id, entity.clone());
        Ok(entity)
    }

    pub fn count<E: Entity>(&self) -> usize {
        self.table::<E>().map(|t| t.len()).unwrap_or(0)
    }

    pub fn all<E: Entity>(&self) -> Vec<E> {
        self.table::<E>().map(|t| t.values().cloned().collect()).unwrap_or_default()
    }

    fn table<E: Entity>(&self) -> Option<&BTreeMap<i64, E>> {
        self.tables.get(E::TABLE).and_then(|t| t.downcast_ref::<BTreeMap<i64, E>>())
    }

    fn table_mut<E: Entity>(&mut self) -> RepositoryResult<&mut BTreeMap<i64, E>> {
        self.tables
            .entry(E::TABLE)
            .or_insert_with(|| Box::new(BTreeMap::<i64, E>::new()))
            .downcast_mut::<BTreeMap<i64, E>>()
            .ok_or_else(|| RepositoryError::Backend(format!("table '{}' holds another entity type", E::TABLE)))
    }
}

fn next_id<E>(table: &BTreeMap<i64, E>) -> i64 {
    table.keys().next_back().copied().unwrap_or(0) + 1
}

impl Repository for MemoryStore {
    fn find_many<E: Entity>(&self, criteria: &Criteria) -> RepositoryResult<Vec<E>> {
        let Some(table) = self.table::<E>() else {
            return Ok(Vec::new());
        };
        Ok(table.values().filter(|e| criteria.matches(&e.to_row())).cloned().collect())
    }

    fn save<E: Entity>(&mut self, entity: &mut E) -> RepositoryResult<SaveOutcome> {
        let messages = entity.validate();
        if !messages.is_empty() {
            return Err(RepositoryError::Validation { entity: E::TABLE, messages });
        }

        let table = self.table_mut::<E>()?;
        let outcome = match entity.id() {
            Some(id) if table.contains_key(&id) => SaveOutcome::Updated,
            Some(_) => SaveOutcome::Inserted,
            None => {
                entity.set_id(next_id(table));
                SaveOutcome::Inserted
            }
        };

        if let Some(id) = entity.id() {
            table.insert(id, entity.clone());
        }
        Ok(outcome)
    }

    fn next_id<E: Entity>(&self) -> RepositoryResult<i64> {
        Ok(self.table::<E>().map(next_id).unwrap_or(1))
    }

    fn delete_with_audit<E: Entity>(&mut self, entity: &E) -> RepositoryResult<AuditRecord> {
        let id = entity.id().ok_or(RepositoryError::NotFound { entity: E::TABLE, id: 0 })?;
        let table = self.table_mut::<E>()?;
        if table.remove(&id).is_none() {
            return Err(RepositoryError::NotFound { entity: E::TABLE, id });
        }
        Ok(AuditRecord { table: E::TABLE, id, sql: crate::audit::delete_statement(entity) })
    }
}
