//! Backing-store capability used by the gateway.
//!
//! A `Store` executes one logical statement per call against a table, using a
//! small predicate language (equality, array containment, case-insensitive
//! substring, inclusive range, missing/present). The live adapter is
//! SurrealDB; demo mode swaps in a stub that never contacts a backend.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::db::schema::{Record, Table};
use crate::error::StoreError;

/// A row as exchanged with the store. The record key is always under `id`.
pub type Row = serde_json::Map<String, Value>;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Filter predicate over a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field = value`
    Eq { field: &'static str, value: Value },
    /// Array `field` contains `value`.
    Contains { field: &'static str, value: Value },
    /// Any of `fields` contains `term`, ignoring case. `term` is stored lowercased.
    Search {
        fields: Vec<&'static str>,
        term: String,
    },
    /// `min <= field <= max`; either bound may be open.
    Range {
        field: &'static str,
        min: Option<Value>,
        max: Option<Value>,
    },
    /// Field is absent, null or blank text.
    Missing(&'static str),
    /// Field holds a non-blank value.
    Present(&'static str),
}

impl Predicate {
    pub fn eq(field: &'static str, value: impl Into<Value>) -> Self {
        Self::Eq {
            field,
            value: value.into(),
        }
    }

    pub fn contains(field: &'static str, value: impl Into<Value>) -> Self {
        Self::Contains {
            field,
            value: value.into(),
        }
    }

    pub fn between(field: &'static str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        Self::Range {
            field,
            min: Some(min.into()),
            max: Some(max.into()),
        }
    }

    /// Case-insensitive substring search. Returns `None` for a blank term so
    /// that an empty search leaves the result set unfiltered.
    pub fn search(fields: &[&'static str], term: &str) -> Option<Self> {
        let term = term.trim();
        if term.is_empty() || fields.is_empty() {
            return None;
        }
        Some(Self::Search {
            fields: fields.to_vec(),
            term: term.to_lowercase(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: &'static str,
    pub descending: bool,
}

/// Read descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: Table,
    pub predicates: Vec<Predicate>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            predicates: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filter_opt(mut self, predicate: Option<Predicate>) -> Self {
        if let Some(p) = predicate {
            self.predicates.push(p);
        }
        self
    }

    pub fn order_by(mut self, field: &'static str) -> Self {
        self.order = Some(Order {
            field,
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, field: &'static str) -> Self {
        self.order = Some(Order {
            field,
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Single-row insert. The row must carry its own `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: Table,
    pub row: Row,
}

impl Insert {
    /// Build an insert from a typed record.
    pub fn record<R: Record>(record: &R) -> Result<Self, StoreError> {
        Ok(Self {
            table: R::TABLE,
            row: to_row(record)?,
        })
    }
}

/// Serialize a record into a row.
pub fn to_row<T: serde::Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::Decode(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Decode rows returned by a store into typed records.
pub fn decode_rows<R: Record>(rows: Vec<Row>) -> Result<Vec<R>, StoreError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(StoreError::from))
        .collect()
}

/// Merge `patch` into every row matching `predicates`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: Table,
    pub predicates: Vec<Predicate>,
    pub patch: Row,
}

/// Delete every row matching `predicates`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: Table,
    pub predicates: Vec<Predicate>,
}

/// Filtered select/insert/update/delete against the backing store.
pub trait Store: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    fn select(&self, query: Select) -> StoreFuture<'_, Vec<Row>>;

    /// Insert one row and return it as stored.
    fn insert(&self, insert: Insert) -> StoreFuture<'_, Row>;

    /// Insert several rows atomically: either all are stored or none are.
    fn insert_all(&self, inserts: Vec<Insert>) -> StoreFuture<'_, Vec<Row>>;

    /// Apply an update and return the rows after the change.
    fn update(&self, update: Update) -> StoreFuture<'_, Vec<Row>>;

    /// Delete matching rows and return them as they were.
    fn delete(&self, delete: Delete) -> StoreFuture<'_, Vec<Row>>;
}
