//! Authority profiles: `GET /{role}/profile?id=` and `PUT /{role}/profile`.

use axum::{
    Json, Router,
    extract::{
        Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::api::{ApiResult, data, json_body, path_param, query_params, with_fields};
use crate::auth::Role;
use crate::db::{AuthorityProfileRecord, Predicate, Row, Select, Table, Update, decode_rows};
use crate::error::GatewayError;
use crate::format::display_name;
use crate::gateway::policy::{AnyAuthority, OwnProfile};
use crate::gateway::{AppState, Scoped};

/// Fields a principal may change on their own profile.
const EDITABLE_FIELDS: [&str; 4] = ["first_name", "last_name", "phone", "designation"];

pub fn routes() -> Router<AppState> {
    Router::new().route("/{role}/profile", get(get_profile).put(update_profile))
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    id: Option<String>,
}

fn path_role(raw: &str) -> Result<Role, GatewayError> {
    raw.parse()
        .map_err(|_| GatewayError::not_found(format!("Unknown portal: {}", raw)))
}

fn profile_view(profile: &AuthorityProfileRecord) -> Result<Value, GatewayError> {
    with_fields(
        profile,
        json!({
            "display_name": display_name(
                profile.first_name.as_deref(),
                profile.last_name.as_deref(),
                None,
                profile.email.as_deref(),
            ),
        }),
    )
}

/// Readable by the profile's owner or by any caller holding the path role.
async fn get_profile(
    scoped: Scoped<AnyAuthority>,
    role: Result<Path<String>, PathRejection>,
    query: Result<Query<ProfileQuery>, QueryRejection>,
) -> ApiResult {
    let role = path_role(&path_param(role)?)?;
    let query = query_params(query)?;
    let id = query
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| GatewayError::validation("Missing required parameter: id"))?;

    let context = scoped.context();
    if id != context.principal().id().as_str() && context.role() != role {
        return Err(GatewayError::RoleMismatch {
            role: context.role().to_string(),
        });
    }

    let profile = scoped
        .fetch_one::<AuthorityProfileRecord>(
            Select::from(Table::AuthorityProfile)
                .filter(Predicate::eq("user_id", id))
                .filter(Predicate::eq("role", role.as_str())),
        )
        .await?
        .ok_or_else(|| GatewayError::not_found("Profile not found"))?;

    data(profile_view(&profile)?)
}

/// Self-service edit of the caller's own profile.
async fn update_profile(
    scoped: Scoped<OwnProfile>,
    role: Result<Path<String>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let role = path_role(&path_param(role)?)?;
    if scoped.context().role() != role {
        return Err(GatewayError::RoleMismatch {
            role: scoped.context().role().to_string(),
        });
    }

    let body = json_body(body)?;
    let mut patch = Row::new();
    for field in EDITABLE_FIELDS {
        match body.get(field) {
            None => {}
            Some(Value::String(s)) => {
                patch.insert(field.to_string(), Value::String(s.trim().to_string()));
            }
            Some(Value::Null) => {
                patch.insert(field.to_string(), Value::Null);
            }
            Some(_) => {
                return Err(GatewayError::validation(format!(
                    "{} must be a string",
                    field
                )));
            }
        }
    }
    if patch.is_empty() {
        return Err(GatewayError::validation("No updatable fields provided"));
    }
    patch.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));

    let updated = scoped
        .update(Update {
            table: Table::AuthorityProfile,
            predicates: vec![Predicate::eq("role", role.as_str())],
            patch,
        })
        .await?;

    let profile = decode_rows::<AuthorityProfileRecord>(updated)?
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::not_found("Profile not found"))?;

    info!(principal = %scoped.context().principal().id(), "Profile updated");
    data(profile_view(&profile)?)
}
