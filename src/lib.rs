pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod gateway;
pub mod types;

#[cfg(test)]
mod testing;

pub use auth::{AuthConfig, Principal, Role};
pub use config::{AppConfig, BackendMode, StatsConfig};
pub use db::{DatabaseConfig, create_connection, ensure_schema};
pub use error::{GatewayError, StoreError};
pub use gateway::AppState;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tracing::{info, warn};

use auth::{DemoSessionStore, JwtSessionStore};
use db::{DemoStore, Store, SurrealStore};

/// Build shared state for the configured backend.
///
/// Live mode connects, ensures the schema and requires a token verifier;
/// demo mode touches nothing.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    match &config.backend {
        BackendMode::Demo => {
            warn!("No live backend configured; running in demo mode (all gated routes answer 401)");
            Ok(AppState::new(
                Arc::new(DemoStore::new()),
                Arc::new(DemoSessionStore),
                config.stats.clone(),
            ))
        }
        BackendMode::Live(db_config) => {
            info!("Connecting to backing store at {}", db_config.url);
            let db = create_connection(db_config.clone()).await?;
            ensure_schema(&db).await?;

            let store: Arc<dyn Store> = Arc::new(SurrealStore::new(db));
            let sessions = JwtSessionStore::new(config.auth.clone(), store.clone())?;

            Ok(AppState::new(store, Arc::new(sessions), config.stats.clone()))
        }
    }
}

/// Build the HTTP application.
pub async fn build_app(config: &AppConfig) -> Result<Router> {
    let state = build_state(config).await?;
    Ok(api::create_router(state))
}
