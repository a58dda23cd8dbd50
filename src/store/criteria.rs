//! Query criteria and named predicates.
//!
//! A [`Criteria`] is a conjunction of [`Filter`]s evaluated against an entity's
//! [`Row`]. Named predicates (`for_season`, `for_meeting`, ...) stand in for the
//! scopes an ORM would apply implicitly; callers chain them explicitly.

use super::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    /// Case-insensitive substring match.
    Like,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(self.column).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => *actual == self.value,
            FilterOp::NotEq => *actual != self.value,
            FilterOp::Like => {
                let needle = self.value.as_text().to_lowercase();
                !needle.is_empty() && actual.as_text().to_lowercase().contains(&needle)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    filters: Vec<Filter>,
}

impl Criteria {
    /// Empty criteria: matches every row.
    pub fn new() -> Self {
        Criteria { filters: Vec::new() }
    }

    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.push(column, FilterOp::Eq, value.into())
    }

    pub fn not_eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.push(column, FilterOp::NotEq, value.into())
    }

    pub fn like(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.push(column, FilterOp::Like, value.into())
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    fn push(mut self, column: &'static str, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter { column, op, value });
        self
    }
}

pub fn for_season(season_id: i64) -> Criteria {
    Criteria::new().eq("season_id", season_id)
}

pub fn for_meeting(meeting_id: i64) -> Criteria {
    Criteria::new().eq("meeting_id", meeting_id)
}

pub fn for_session(session_id: i64) -> Criteria {
    Criteria::new().eq("meeting_session_id", session_id)
}

pub fn in_city(city_id: i64) -> Criteria {
    Criteria::new().eq("city_id", city_id)
}

pub fn of_pool_type(criteria: Criteria, pool_type: &str) -> Criteria {
    criteria.eq("pool_type", pool_type)
}
