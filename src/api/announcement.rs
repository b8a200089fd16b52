//! Announcement creation and listing shared by the HOD and T&P portals.

use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::api::{ApiResult, ListParams, data, optional_str, required_str};
use crate::db::{AnnouncementRecord, Insert, Predicate, Row, Select, Table, decode_rows};
use crate::error::GatewayError;
use crate::gateway::ScopedExecutor;
use crate::types::RecordKey;

const PRIORITIES: [&str; 3] = ["low", "normal", "high"];

/// Announcements written by the caller's role, newest first.
pub async fn list(scoped: &ScopedExecutor, params: &ListParams) -> ApiResult {
    let query = Select::from(Table::Announcement)
        .filter(Predicate::eq("author_role", scoped.context().role().as_str()))
        .filter_opt(Predicate::search(&["title", "content"], params.search()))
        .order_by_desc("created_at")
        .limit(params.limit()?);

    data(scoped.fetch::<AnnouncementRecord>(query).await?)
}

/// Create an announcement. `department` is overridden by a department scope.
pub async fn create(scoped: &ScopedExecutor, body: Row) -> ApiResult {
    let title = required_str(&body, "title")?;
    let content = required_str(&body, "content")?;
    let priority = match optional_str(&body, "priority") {
        None => "normal".to_string(),
        Some(p) => {
            let p = p.to_lowercase();
            if !PRIORITIES.contains(&p.as_str()) {
                return Err(GatewayError::validation(
                    "priority must be one of: low, normal, high",
                ));
            }
            p
        }
    };

    let context = scoped.context();
    let announcement = AnnouncementRecord {
        id: RecordKey::generate().into_inner(),
        title,
        content,
        priority,
        department: optional_str(&body, "department"),
        audience: optional_str(&body, "audience"),
        author_id: context.principal().id().to_string(),
        author_role: context.role().to_string(),
        created_at: Some(Utc::now().to_rfc3339()),
    };

    let row = scoped.insert(Insert::record(&announcement)?).await?;
    let stored: AnnouncementRecord = decode_rows(vec![row])?
        .into_iter()
        .next()
        .unwrap_or(announcement);

    Ok(Json(json!({
        "data": stored,
        "message": "Announcement created successfully"
    })))
}
