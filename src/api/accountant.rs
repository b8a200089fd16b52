use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use crate::api::{
    ApiResult, ListParams, data, json_body, optional_number, optional_str, query_params,
    required_int, required_str,
};
use crate::db::{Insert, Predicate, Select, StudentRecord, Table, TransactionRecord};
use crate::error::{GatewayError, StoreError};
use crate::format::{percentage, round2};
use crate::gateway::policy::Accountant;
use crate::gateway::{AppState, Scoped};
use crate::types::RecordKey;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accountant/register-student", post(register_student))
        .route("/accountant/stats", get(stats))
        .route("/accountant/transactions", get(transactions))
}

fn duplicate_student() -> GatewayError {
    GatewayError::Conflict("A student with this ID already exists".to_string())
}

/// Register a student and, when a fee is charged, its pending debit.
///
/// Both rows are written in one atomic batch.
async fn register_student(
    scoped: Scoped<Accountant>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = json_body(body)?;

    let name = required_str(&body, "name")?;
    let email = required_str(&body, "email")?;
    let student_id = required_str(&body, "student_id")?;
    let department = required_str(&body, "department")?;
    let semester = required_int(&body, "semester")?;

    if !(1..=8).contains(&semester) {
        return Err(GatewayError::validation("semester must be between 1 and 8"));
    }
    if !email.contains('@') {
        return Err(GatewayError::validation("Invalid email address"));
    }
    let fee_amount = optional_number(&body, "fee_amount")?.unwrap_or(0.0);
    if fee_amount < 0.0 {
        return Err(GatewayError::validation("fee_amount cannot be negative"));
    }

    let existing = scoped
        .fetch_one::<StudentRecord>(
            Select::from(Table::Student).filter(Predicate::eq("student_id", student_id.as_str())),
        )
        .await?;
    if existing.is_some() {
        return Err(duplicate_student());
    }

    let (first_name, last_name) = match name.split_once(char::is_whitespace) {
        Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
        None => (Some(name.clone()), None),
    };
    let tags = body
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let now = Utc::now().to_rfc3339();

    let student = StudentRecord {
        id: RecordKey::generate().into_inner(),
        student_id,
        name,
        first_name,
        last_name,
        email,
        phone: optional_str(&body, "phone"),
        department,
        semester,
        fee_amount: Some(fee_amount),
        fee_status: if fee_amount > 0.0 { "unpaid" } else { "paid" }.to_string(),
        tags,
        room_number: optional_str(&body, "room_number"),
        registered_by: Some(scoped.context().principal().id().to_string()),
        created_at: Some(now.clone()),
        ..Default::default()
    };

    let mut batch = vec![Insert::record(&student)?];
    if fee_amount > 0.0 {
        let debit = TransactionRecord {
            id: RecordKey::generate().into_inner(),
            student_record_id: student.id.clone(),
            amount: -fee_amount,
            kind: "debit".to_string(),
            status: "pending".to_string(),
            description: Some("Registration fee".to_string()),
            created_at: Some(now),
        };
        batch.push(Insert::record(&debit)?);
    }

    // A concurrent registration can slip past the lookup; the unique index catches it.
    scoped.insert_all(batch).await.map_err(|err| match err {
        GatewayError::Store(StoreError::Duplicate { .. }) => duplicate_student(),
        other => other,
    })?;

    info!(
        student_id = %student.student_id,
        registered_by = %scoped.context().principal().id(),
        fee_amount,
        "Student registered"
    );

    Ok(Json(json!({
        "data": student,
        "message": "Student registered successfully"
    })))
}

async fn stats(scoped: Scoped<Accountant>, State(state): State<AppState>) -> ApiResult {
    let (students, transactions) = tokio::try_join!(
        scoped.fetch::<StudentRecord>(Select::from(Table::Student)),
        scoped.fetch::<TransactionRecord>(Select::from(Table::Transaction)),
    )?;

    let average_fee = state.stats().average_fee;
    let total_students = students.len() as u64;
    let count_status = |status: &str| students.iter().filter(|s| s.fee_status == status).count() as u64;
    let paid_students = count_status("paid");
    let partial_students = count_status("partial");
    let unpaid_students = count_status("unpaid");

    let expected_fees: f64 = students
        .iter()
        .map(|s| s.fee_amount.unwrap_or(average_fee))
        .sum();
    let collected: f64 = transactions
        .iter()
        .filter(|t| t.kind == "credit" && t.status == "completed")
        .map(|t| t.amount.abs())
        .sum();
    let pending_dues: f64 = transactions
        .iter()
        .filter(|t| t.kind == "debit" && t.status == "pending")
        .map(|t| t.amount.abs())
        .sum();

    Ok(Json(json!({
        "total_students": total_students,
        "paid_students": paid_students,
        "partial_students": partial_students,
        "unpaid_students": unpaid_students,
        "expected_fees": round2(expected_fees),
        "collected_amount": round2(collected),
        "pending_dues": round2(pending_dues),
        "collection_rate": percentage(paid_students, total_students),
        "transaction_count": transactions.len(),
    })))
}

async fn transactions(
    scoped: Scoped<Accountant>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let query = Select::from(Table::Transaction)
        .filter_opt(params.student_id().map(|id| Predicate::eq("student_record_id", id)))
        .filter_opt(params.status().map(|status| Predicate::eq("status", status)))
        .order_by_desc("created_at")
        .limit(params.limit()?);

    data(scoped.fetch::<TransactionRecord>(query).await?)
}
