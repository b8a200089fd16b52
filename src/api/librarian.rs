use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Query, rejection::QueryRejection},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::api::{ApiResult, ListParams, data, query_params, with_fields};
use crate::db::{IssuanceRecord, Predicate, Select, Table};
use crate::error::GatewayError;
use crate::format::{is_overdue, percentage};
use crate::gateway::policy::Librarian;
use crate::gateway::{AppState, Scoped};

const ISSUANCE_SEARCH_FIELDS: [&str; 4] = ["book_title", "book_isbn", "student_name", "student_code"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/librarian/issued-records", get(issued_records))
        .route("/librarian/stats", get(stats))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IssuanceStatus {
    Issued,
    Returned,
    Overdue,
}

impl IssuanceStatus {
    fn parse(value: &str) -> Result<Self, GatewayError> {
        match value.to_ascii_lowercase().as_str() {
            "issued" => Ok(Self::Issued),
            "returned" => Ok(Self::Returned),
            "overdue" => Ok(Self::Overdue),
            _ => Err(GatewayError::validation(
                "status must be one of: issued, returned, overdue",
            )),
        }
    }

    fn of(record: &IssuanceRecord, now: DateTime<Utc>) -> Self {
        if is_returned(record) {
            Self::Returned
        } else if is_overdue(record.due_date.as_deref(), None, now) {
            Self::Overdue
        } else {
            Self::Issued
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Returned => "returned",
            Self::Overdue => "overdue",
        }
    }
}

fn is_returned(record: &IssuanceRecord) -> bool {
    record
        .returned_at
        .as_deref()
        .is_some_and(|r| !r.trim().is_empty())
}

async fn issued_records(
    scoped: Scoped<Librarian>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let status = params.status().map(IssuanceStatus::parse).transpose()?;
    let limit = params.limit()?;

    let mut query = Select::from(Table::BookIssuance)
        .filter_opt(Predicate::search(&ISSUANCE_SEARCH_FIELDS, params.search()))
        .order_by_desc("issued_at");
    query = match status {
        Some(IssuanceStatus::Returned) => query.filter(Predicate::Present("returned_at")),
        Some(IssuanceStatus::Issued | IssuanceStatus::Overdue) => {
            query.filter(Predicate::Missing("returned_at"))
        }
        None => query,
    };
    // Overdue is decided against the clock, so the cap is applied after filtering.
    if status != Some(IssuanceStatus::Overdue) {
        query = query.limit(limit);
    }

    let now = Utc::now();
    let records = scoped.fetch::<IssuanceRecord>(query).await?;
    let rows = records
        .iter()
        .map(|record| (record, IssuanceStatus::of(record, now)))
        .filter(|(_, derived)| {
            status != Some(IssuanceStatus::Overdue) || *derived == IssuanceStatus::Overdue
        })
        .take(limit)
        .map(|(record, derived)| {
            with_fields(
                record,
                json!({
                    "status": derived.as_str(),
                    "is_overdue": derived == IssuanceStatus::Overdue,
                }),
            )
        })
        .collect::<Result<Vec<Value>, GatewayError>>()?;

    data(rows)
}

async fn stats(scoped: Scoped<Librarian>) -> ApiResult {
    let records = scoped
        .fetch::<IssuanceRecord>(Select::from(Table::BookIssuance))
        .await?;

    let now = Utc::now();
    let total = records.len() as u64;
    let returned = records.iter().filter(|r| is_returned(r)).count() as u64;
    let overdue = records
        .iter()
        .filter(|r| IssuanceStatus::of(r, now) == IssuanceStatus::Overdue)
        .count() as u64;
    let borrowers: HashSet<&str> = records
        .iter()
        .filter_map(|r| r.student_record_id.as_deref().or(r.student_code.as_deref()))
        .collect();

    Ok(Json(json!({
        "total_issued": total,
        "active_issues": total - returned,
        "returned_books": returned,
        "overdue_books": overdue,
        "overdue_rate": percentage(overdue, total - returned),
        "unique_borrowers": borrowers.len(),
    })))
}
