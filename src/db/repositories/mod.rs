//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity.

pub mod category;
pub mod entry;

pub use category::{CategoryFilter, CategoryRepository, SqlxCategoryRepository};
pub use entry::{EntryFilter, EntryOrder, EntryRepository, SqlxEntryRepository};

use chrono::{DateTime, Utc};
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// A value bound to a `?` placeholder of a dynamically assembled query
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
    Bool(bool),
}

/// `WHERE` clause assembled from optional conditions.
///
/// Conditions use `?` placeholders, which both SQLite and MySQL accept, and
/// their values are kept in placeholder order.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: impl Into<String>, values: impl IntoIterator<Item = SqlValue>) {
        self.conditions.push(condition.into());
        self.values.extend(values);
    }

    /// Add `column IN (?, ?, ...)`; an empty list matches nothing
    pub fn push_in(&mut self, column: &str, ids: &[i64]) {
        if ids.is_empty() {
            self.conditions.push("1 = 0".to_string());
            return;
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        self.push(
            format!("{} IN ({})", column, placeholders),
            ids.iter().map(|id| SqlValue::Int(*id)),
        );
    }

    /// The clause text, including the leading `WHERE`, or an empty string
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

pub(crate) fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

pub(crate) fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

/// Pattern matching `term` anywhere, for use with `LIKE ? ESCAPE '!'`
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('!', "!!")
        .replace('%', "!%")
        .replace('_', "!_");
    format!("%{}%", escaped)
}
