//! Error types shared by the gateway pipeline.
//!
//! Every pipeline failure maps to a fixed status code and a `{ "error": ... }`
//! body. Store failures are logged with their full text and answered with a
//! generic message.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error, warn};

/// Errors raised by a backing store adapter.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Connecting to or selecting the database failed.
    Connection(String),
    /// A statement was rejected or failed while executing.
    Query(String),
    /// A row could not be converted to or from its record type.
    Decode(String),
    /// A write would repeat a value held by a unique index.
    Duplicate { index: String },
    /// The backend is not available (demo mode).
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "Store connection error: {}", msg),
            Self::Query(msg) => write!(f, "Store query error: {}", msg),
            Self::Decode(msg) => write!(f, "Store decode error: {}", msg),
            Self::Duplicate { index } => write!(f, "Duplicate value for unique index '{}'", index),
            Self::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Terminal failure states of a gated request.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// No valid session credential.
    Unauthenticated,
    /// The principal has no active authority profile.
    ProfileNotFound,
    /// The profile role is not in the operation's allow-list.
    RoleMismatch { role: String },
    /// The operation needs a department but the profile has none.
    ScopeUnavailable,
    /// A request field is missing, blank or malformed.
    Validation(String),
    /// A uniqueness constraint would be violated.
    Conflict(String),
    /// The requested record does not exist within the caller's scope.
    NotFound(String),
    /// The backing store failed.
    Store(StoreError),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::ProfileNotFound | Self::RoleMismatch { .. } | Self::ScopeUnavailable => {
                StatusCode::FORBIDDEN
            }
            // Duplicate keys answer 400 to match existing clients.
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated => "Unauthorized".to_string(),
            Self::ProfileNotFound | Self::RoleMismatch { .. } | Self::ScopeUnavailable => {
                "Access denied".to_string()
            }
            Self::Validation(msg) | Self::Conflict(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Store(_) => "Internal server error".to_string(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Authentication required"),
            Self::ProfileNotFound => write!(f, "No authority profile for principal"),
            Self::RoleMismatch { role } => write!(f, "Role '{}' is not permitted", role),
            Self::ScopeUnavailable => write!(f, "Profile has no department assigned"),
            Self::Validation(msg) => write!(f, "Validation failed: {}", msg),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            Self::Store(err) => error!(error = %err, "Request failed in backing store"),
            Self::ProfileNotFound | Self::RoleMismatch { .. } | Self::ScopeUnavailable => {
                warn!(reason = %self, "Request forbidden")
            }
            _ => debug!(reason = %self, "Request rejected"),
        }

        let body = Json(json!({ "error": self.public_message() }));
        (self.status(), body).into_response()
    }
}
