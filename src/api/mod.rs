//! HTTP routes.
//!
//! Every route except `/health` is gated: handlers take a `Scoped<Policy>`
//! (or `Authenticated`) extractor first, so rejection happens before any
//! query parameter or body is looked at.

mod accountant;
mod announcement;
mod auth;
mod hod;
mod hostel;
mod librarian;
mod profile;
mod tnp;

#[cfg(test)]
mod integration_tests;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::{Row, to_row};
use crate::error::GatewayError;
use crate::format::semester_range;
use crate::gateway::AppState;

pub type ApiResult = Result<Json<Value>, GatewayError>;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 500;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(auth::routes())
        .merge(accountant::routes())
        .merge(hod::routes())
        .merge(hostel::routes())
        .merge(librarian::routes())
        .merge(tnp::routes())
        .merge(profile::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "mode": state.backend(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// `{ "data": ... }` envelope.
pub fn data(value: impl Serialize) -> ApiResult {
    Ok(Json(json!({ "data": value })))
}

/// A record serialized with extra derived fields merged in.
pub fn with_fields<T: Serialize>(record: &T, fields: Value) -> Result<Value, GatewayError> {
    let mut row = to_row(record)?;
    if let Value::Object(fields) = fields {
        row.extend(fields);
    }
    Ok(Value::Object(row))
}

/// Query parameters shared by the list endpoints. Everything arrives as a
/// string and is validated here so malformed values answer with the JSON
/// error envelope.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub block: Option<String>,
    pub student_id: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ListParams {
    pub fn search(&self) -> &str {
        self.search.as_deref().unwrap_or("")
    }

    pub fn department(&self) -> Option<&str> {
        non_blank(&self.department)
    }

    pub fn status(&self) -> Option<&str> {
        non_blank(&self.status)
    }

    pub fn block(&self) -> Option<&str> {
        non_blank(&self.block)
    }

    pub fn student_id(&self) -> Option<&str> {
        non_blank(&self.student_id)
    }

    /// Result cap: default 100, at most 500.
    pub fn limit(&self) -> Result<usize, GatewayError> {
        match non_blank(&self.limit) {
            None => Ok(DEFAULT_LIMIT),
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) | Err(_) => Err(GatewayError::validation(
                    "limit must be a positive integer",
                )),
                Ok(n) => Ok(n.min(MAX_LIMIT)),
            },
        }
    }

    /// Semester range for the `year` filter.
    pub fn semesters(&self) -> Result<Option<(i64, i64)>, GatewayError> {
        let Some(raw) = non_blank(&self.year) else {
            return Ok(None);
        };
        raw.parse::<u8>()
            .ok()
            .and_then(semester_range)
            .map(Some)
            .ok_or_else(|| GatewayError::validation("year must be between 1 and 4"))
    }
}

/// Unwrap a JSON object body, answering malformed input with a 400.
pub fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Row, GatewayError> {
    match body {
        Ok(Json(Value::Object(row))) => Ok(row),
        Ok(_) => Err(GatewayError::validation("Request body must be a JSON object")),
        Err(rejection) => Err(GatewayError::validation(format!(
            "Invalid request body: {}",
            rejection.body_text()
        ))),
    }
}

/// Unwrap query parameters, answering a malformed query string with a 400.
pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, GatewayError> {
    match query {
        Ok(Query(params)) => Ok(params),
        Err(rejection) => Err(GatewayError::validation(format!(
            "Invalid query string: {}",
            rejection.body_text()
        ))),
    }
}

/// Unwrap a path parameter, answering a malformed segment with a 400.
pub fn path_param<T>(path: Result<Path<T>, PathRejection>) -> Result<T, GatewayError> {
    match path {
        Ok(Path(value)) => Ok(value),
        Err(rejection) => Err(GatewayError::validation(format!(
            "Invalid path: {}",
            rejection.body_text()
        ))),
    }
}

/// Trimmed, non-blank string field. Numbers are accepted and stringified.
pub fn optional_str(body: &Row, field: &str) -> Option<String> {
    match body.get(field)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn required_str(body: &Row, field: &str) -> Result<String, GatewayError> {
    optional_str(body, field)
        .ok_or_else(|| GatewayError::validation(format!("Missing required field: {}", field)))
}

/// Number field, also accepted as a numeric string. Blank means absent.
pub fn optional_number(body: &Row, field: &str) -> Result<Option<f64>, GatewayError> {
    let invalid = || GatewayError::validation(format!("{} must be a number", field));
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(invalid),
        Some(_) => Err(invalid()),
    }
}

/// Whole-number field, also accepted as a numeric string.
pub fn required_int(body: &Row, field: &str) -> Result<i64, GatewayError> {
    let value = optional_number(body, field)?
        .ok_or_else(|| GatewayError::validation(format!("Missing required field: {}", field)))?;
    if value.fract() != 0.0 {
        return Err(GatewayError::validation(format!(
            "{} must be a whole number",
            field
        )));
    }
    Ok(value as i64)
}
