//! Diff log: the replayable record of every mutation a run performed.
//!
//! Each resolver keeps its own [`DiffLog`]; the reconciler appends them into a
//! per-entry log and, when that log carries changes, into the run log.
//!
//! ```text
//! sql      INSERT/UPDATE/DELETE statements, plus "-- ERROR" comment lines
//! actions  human-readable narrative ("Meeting created: ...")
//! ```

use crate::store::{AuditRecord, Entity, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffLog {
    pub sql: Vec<String>,
    pub actions: Vec<String>,
    changes: usize,
}

impl DiffLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when at least one statement (not a comment) was recorded.
    pub fn has_changes(&self) -> bool {
        self.changes > 0
    }

    pub fn change_count(&self) -> usize {
        self.changes
    }

    pub fn record_insert<E: Entity>(&mut self, entity: &E, action: impl Into<String>) {
        self.sql.push(insert_statement(entity));
        self.actions.push(action.into());
        self.changes += 1;
    }

    /// Record an update of `columns`; `updated_at` is appended when the entity has one.
    pub fn record_update<E: Entity>(&mut self, entity: &E, columns: &[&'static str], action: impl Into<String>) {
        if columns.is_empty() {
            return;
        }
        self.sql.push(update_statement(entity, columns));
        self.actions.push(action.into());
        self.changes += 1;
    }

    pub fn record_delete(&mut self, record: AuditRecord, action: impl Into<String>) {
        self.sql.push(record.sql);
        self.actions.push(action.into());
        self.changes += 1;
    }

    pub fn note(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
    }

    /// Validation or backend failure. Kept in the SQL stream as a comment so a
    /// replay shows where a statement is missing.
    pub fn error(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref().replace('\n', " ");
        self.sql.push(format!("-- ERROR: {message}"));
        self.actions.push(format!("ERROR: {message}"));
    }

    pub fn append(&mut self, other: &DiffLog) {
        self.sql.extend(other.sql.iter().cloned());
        self.actions.extend(other.actions.iter().cloned());
        self.changes += other.changes;
    }

    pub fn to_sql_script(&self) -> String {
        let mut script = self.sql.join("\n");
        if !script.is_empty() {
            script.push('\n');
        }
        script
    }
}

pub fn insert_statement<E: Entity>(entity: &E) -> String {
    let row = entity.to_row();
    let (columns, values): (Vec<&str>, Vec<String>) = row
        .iter()
        .filter(|(c, v)| !(*c == "id" && *v == Value::Null))
        .map(|(c, v)| (*c, v.to_sql()))
        .unzip();
    format!("INSERT INTO {} ({}) VALUES ({});", E::TABLE, columns.join(", "), values.join(", "))
}

pub fn update_statement<E: Entity>(entity: &E, columns: &[&'static str]) -> String {
    let row = entity.to_row();
    let mut assignments: Vec<String> = columns
        .iter()
        .filter_map(|c| row.get(c).map(|v| format!("{}={}", c, v.to_sql())))
        .collect();
    if !columns.contains(&"updated_at") {
        if let Some(ts) = row.get("updated_at") {
            assignments.push(format!("updated_at={}", ts.to_sql()));
        }
    }
    format!("UPDATE {} SET {} WHERE id={};", E::TABLE, assignments.join(", "), id_sql(entity))
}

pub fn delete_statement<E: Entity>(entity: &E) -> String {
    format!("DELETE FROM {} WHERE id={};", E::TABLE, id_sql(entity))
}

fn id_sql<E: Entity>(entity: &E) -> String {
    entity.id().map(|id| id.to_string()).unwrap_or_else(|| "NULL".to_string())
}
