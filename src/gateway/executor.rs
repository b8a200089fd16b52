//! The only handle onto domain tables.
//!
//! A `ScopedExecutor` is created by the authorizer once a `ScopeContext`
//! exists, and every statement it runs carries the scope's constraint.

use std::sync::Arc;

use tracing::debug;

use crate::db::{Delete, Insert, Record, Row, Select, Store, Update, decode_rows};
use crate::error::GatewayError;
use crate::gateway::scope::{Constraint, ScopeContext};

pub struct ScopedExecutor {
    store: Arc<dyn Store>,
    context: ScopeContext,
}

impl ScopedExecutor {
    pub(crate) fn new(store: Arc<dyn Store>, context: ScopeContext) -> Self {
        Self { store, context }
    }

    pub fn context(&self) -> &ScopeContext {
        &self.context
    }

    pub async fn select(&self, mut query: Select) -> Result<Vec<Row>, GatewayError> {
        if let Some(predicate) = self.context.constraint().predicate(query.table) {
            query.predicates.push(predicate);
        }
        debug!(
            table = %query.table,
            role = %self.context.role(),
            filters = query.predicates.len(),
            "Scoped select"
        );
        Ok(self.store.select(query).await?)
    }

    /// Select and decode into `R`. The query must target `R::TABLE`.
    pub async fn fetch<R: Record>(&self, query: Select) -> Result<Vec<R>, GatewayError> {
        debug_assert_eq!(query.table, R::TABLE);
        Ok(decode_rows(self.select(query).await?)?)
    }

    /// First matching record, if any.
    pub async fn fetch_one<R: Record>(&self, query: Select) -> Result<Option<R>, GatewayError> {
        Ok(self.fetch(query.limit(1)).await?.into_iter().next())
    }

    pub async fn insert(&self, mut insert: Insert) -> Result<Row, GatewayError> {
        self.context
            .constraint()
            .stamp(insert.table, &mut insert.row);
        debug!(table = %insert.table, role = %self.context.role(), "Scoped insert");
        Ok(self.store.insert(insert).await?)
    }

    /// Insert several rows in one atomic write.
    pub async fn insert_all(&self, mut inserts: Vec<Insert>) -> Result<Vec<Row>, GatewayError> {
        for insert in &mut inserts {
            self.context
                .constraint()
                .stamp(insert.table, &mut insert.row);
        }
        debug!(
            rows = inserts.len(),
            role = %self.context.role(),
            "Scoped atomic insert"
        );
        Ok(self.store.insert_all(inserts).await?)
    }

    pub async fn update(&self, mut update: Update) -> Result<Vec<Row>, GatewayError> {
        let constraint = self.context.constraint();
        if let Some(predicate) = constraint.predicate(update.table) {
            update.predicates.push(predicate);
        }
        // A merge patch carrying only the tag would replace the tag list.
        if !matches!(constraint, Constraint::Tag(_)) {
            constraint.stamp(update.table, &mut update.patch);
        }
        debug!(table = %update.table, role = %self.context.role(), "Scoped update");
        Ok(self.store.update(update).await?)
    }

    pub async fn delete(&self, mut delete: Delete) -> Result<Vec<Row>, GatewayError> {
        if let Some(predicate) = self.context.constraint().predicate(delete.table) {
            delete.predicates.push(predicate);
        }
        debug!(table = %delete.table, role = %self.context.role(), "Scoped delete");
        Ok(self.store.delete(delete).await?)
    }
}
