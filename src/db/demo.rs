//! Stub store used when no live backend is configured.
//!
//! Reads return nothing and writes fail with `StoreError::Unavailable`; no
//! network or disk access ever happens.

use tracing::debug;

use crate::db::store::{Delete, Insert, Row, Select, Store, StoreFuture, Update};
use crate::error::StoreError;

const DEMO_WRITE_MESSAGE: &str = "writes are disabled in demo mode";

#[derive(Debug, Clone, Default)]
pub struct DemoStore;

impl DemoStore {
    pub fn new() -> Self {
        Self
    }
}

impl Store for DemoStore {
    fn backend(&self) -> &'static str {
        "demo"
    }

    fn select(&self, query: Select) -> StoreFuture<'_, Vec<Row>> {
        debug!(table = %query.table, "Demo store select");
        Box::pin(async { Ok(Vec::new()) })
    }

    fn insert(&self, insert: Insert) -> StoreFuture<'_, Row> {
        debug!(table = %insert.table, "Demo store insert refused");
        Box::pin(async { Err(StoreError::Unavailable(DEMO_WRITE_MESSAGE.to_string())) })
    }

    fn insert_all(&self, _inserts: Vec<Insert>) -> StoreFuture<'_, Vec<Row>> {
        Box::pin(async { Err(StoreError::Unavailable(DEMO_WRITE_MESSAGE.to_string())) })
    }

    fn update(&self, update: Update) -> StoreFuture<'_, Vec<Row>> {
        debug!(table = %update.table, "Demo store update refused");
        Box::pin(async { Err(StoreError::Unavailable(DEMO_WRITE_MESSAGE.to_string())) })
    }

    fn delete(&self, delete: Delete) -> StoreFuture<'_, Vec<Row>> {
        debug!(table = %delete.table, "Demo store delete refused");
        Box::pin(async { Err(StoreError::Unavailable(DEMO_WRITE_MESSAGE.to_string())) })
    }
}
