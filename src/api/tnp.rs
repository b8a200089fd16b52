use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::get,
};
use serde_json::{Value, json};

use crate::api::{
    ApiResult, ListParams, announcement, data, json_body, query_params, with_fields,
};
use crate::config::StatsConfig;
use crate::db::{Predicate, Select, StudentRecord, Table};
use crate::error::GatewayError;
use crate::format::{average, display_name, year_of_semester};
use crate::gateway::policy::Placement;
use crate::gateway::{AppState, Scoped};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tnp/students", get(students))
        .route("/tnp/stats", get(stats))
        .route(
            "/tnp/announcements",
            get(list_announcements).post(create_announcement),
        )
}

fn is_eligible(student: &StudentRecord, config: &StatsConfig) -> bool {
    student.semester >= config.min_placement_semester
        && student
            .cgpa
            .is_some_and(|cgpa| cgpa >= config.min_placement_cgpa)
}

fn is_placed(student: &StudentRecord) -> bool {
    student.placement_status.as_deref() == Some("placed")
}

/// Institution-wide student list with placement fields.
async fn students(
    scoped: Scoped<Placement>,
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let mut query = Select::from(Table::Student)
        .filter_opt(Predicate::search(
            &["name", "student_id", "email", "company"],
            params.search(),
        ))
        .filter_opt(params.department().map(|d| Predicate::eq("department", d)))
        .filter_opt(
            params
                .status()
                .map(|status| Predicate::eq("placement_status", status)),
        )
        .order_by("name")
        .limit(params.limit()?);
    if let Some((min, max)) = params.semesters()? {
        query = query.filter(Predicate::between("semester", min, max));
    }

    let students = scoped.fetch::<StudentRecord>(query).await?;
    let rows = students
        .iter()
        .map(|s| {
            with_fields(
                s,
                json!({
                    "display_name": display_name(
                        s.first_name.as_deref(),
                        s.last_name.as_deref(),
                        Some(&s.name),
                        Some(&s.email),
                    ),
                    "year": year_of_semester(s.semester),
                    "eligible": is_eligible(s, state.stats()),
                }),
            )
        })
        .collect::<Result<Vec<Value>, GatewayError>>()?;

    data(rows)
}

async fn stats(scoped: Scoped<Placement>, State(state): State<AppState>) -> ApiResult {
    let students = scoped
        .fetch::<StudentRecord>(Select::from(Table::Student))
        .await?;
    let config = state.stats();

    let eligible = students.iter().filter(|s| is_eligible(s, config)).count();
    let placed = students.iter().filter(|s| is_placed(s)).count();
    let cgpas: Vec<f64> = students.iter().filter_map(|s| s.cgpa).collect();
    let companies: HashSet<&str> = students
        .iter()
        .filter(|s| is_placed(s))
        .filter_map(|s| s.company.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    Ok(Json(json!({
        "total_students": students.len(),
        "eligible_students": eligible,
        "placed_students": placed,
        "placement_rate": config.placement_rate,
        "average_cgpa": average(&cgpas),
        "recruiting_companies": companies.len(),
    })))
}

async fn list_announcements(
    scoped: Scoped<Placement>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    announcement::list(&scoped, &params).await
}

async fn create_announcement(
    scoped: Scoped<Placement>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = json_body(body)?;
    announcement::create(&scoped, body).await
}
