//! Process configuration, resolved once at startup.
//!
//! The CLI reads its flags with environment fallbacks (`SURREALDB_URL`,
//! `EDU_SYNC_DEMO_MODE`, `EDU_SYNC_JWT_*`); business constants for the
//! statistics endpoints come from `EDU_SYNC_*` variables with defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::auth::AuthConfig;
use crate::db::DatabaseConfig;

/// Parse an environment variable, ignoring (with a warning) values that do not parse.
pub fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", name, raw);
            None
        }
    }
}

/// Which backing store serves requests. Chosen once, never switched at runtime.
#[derive(Debug, Clone)]
pub enum BackendMode {
    Live(DatabaseConfig),
    /// No backend is contacted: reads are empty, writes fail, nobody signs in.
    Demo,
}

impl BackendMode {
    /// Demo mode when requested explicitly or when no database URL is set.
    pub fn select(demo_requested: bool, db_url: Option<String>) -> Self {
        match db_url.filter(|url| !url.trim().is_empty()) {
            Some(url) if !demo_requested => Self::Live(DatabaseConfig {
                url,
                ..Default::default()
            }),
            _ => Self::Demo,
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, Self::Demo)
    }
}

/// Placeholder business constants used by the statistics endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Reported placement rate (percent) until placement outcomes are tracked.
    pub placement_rate: f64,
    /// Fee assumed for students registered without one.
    pub average_fee: f64,
    /// Minimum CGPA for placement eligibility.
    pub min_placement_cgpa: f64,
    /// Minimum semester for placement eligibility.
    pub min_placement_semester: i64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            placement_rate: 85.0,
            average_fee: 50000.0,
            min_placement_cgpa: 6.0,
            min_placement_semester: 5,
        }
    }
}

impl StatsConfig {
    /// Defaults overridden by `EDU_SYNC_PLACEMENT_RATE`, `EDU_SYNC_AVERAGE_FEE`,
    /// `EDU_SYNC_MIN_PLACEMENT_CGPA` and `EDU_SYNC_MIN_PLACEMENT_SEMESTER`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            placement_rate: env_parse("EDU_SYNC_PLACEMENT_RATE").unwrap_or(defaults.placement_rate),
            average_fee: env_parse("EDU_SYNC_AVERAGE_FEE").unwrap_or(defaults.average_fee),
            min_placement_cgpa: env_parse("EDU_SYNC_MIN_PLACEMENT_CGPA")
                .unwrap_or(defaults.min_placement_cgpa),
            min_placement_semester: env_parse("EDU_SYNC_MIN_PLACEMENT_SEMESTER")
                .unwrap_or(defaults.min_placement_semester),
        }
    }
}

/// Everything needed to build the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendMode,
    pub auth: AuthConfig,
    pub stats: StatsConfig,
}
