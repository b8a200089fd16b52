use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{
        Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    routing::{delete, get},
};
use serde_json::{Value, json};
use tracing::info;

use crate::api::{
    ApiResult, ListParams, announcement, data, json_body, path_param, query_params, with_fields,
};
use crate::db::{
    AnnouncementRecord, AttendanceRecord, AuthorityProfileRecord, Delete, Predicate, Select,
    StudentRecord, Table, decode_rows,
};
use crate::error::GatewayError;
use crate::format::{display_name, percentage, year_of_semester};
use crate::gateway::policy::HodDepartment;
use crate::gateway::{AppState, Scoped};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hod/students", get(students))
        .route(
            "/hod/announcements",
            get(list_announcements).post(create_announcement),
        )
        .route("/hod/announcements/{id}", delete(delete_announcement))
        .route("/hod/stats", get(stats))
}

/// Students of the HOD's department, optionally narrowed by search and year.
async fn students(
    scoped: Scoped<HodDepartment>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let mut query = Select::from(Table::Student)
        .filter_opt(Predicate::search(
            &["name", "student_id", "email"],
            params.search(),
        ))
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
                }),
            )
        })
        .collect::<Result<Vec<Value>, GatewayError>>()?;

    data(rows)
}

async fn list_announcements(
    scoped: Scoped<HodDepartment>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    announcement::list(&scoped, &params).await
}

async fn create_announcement(
    scoped: Scoped<HodDepartment>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = json_body(body)?;
    announcement::create(&scoped, body).await
}

/// Delete an announcement the HOD can see: same department, written by an HOD.
async fn delete_announcement(
    scoped: Scoped<HodDepartment>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult {
    let id = path_param(id)?;
    let removed = scoped
        .delete(Delete {
            table: Table::Announcement,
            predicates: vec![
                Predicate::eq("id", id.as_str()),
                Predicate::eq("author_role", scoped.context().role().as_str()),
            ],
        })
        .await?;

    let removed: Vec<AnnouncementRecord> = decode_rows(removed)?;
    match removed.into_iter().next() {
        Some(announcement) => {
            info!(announcement = %announcement.id, "Announcement deleted");
            data(announcement)
        }
        None => Err(GatewayError::not_found("Announcement not found")),
    }
}

async fn stats(scoped: Scoped<HodDepartment>) -> ApiResult {
    let (students, faculty, attendance, announcements) = tokio::try_join!(
        scoped.fetch::<StudentRecord>(Select::from(Table::Student)),
        scoped.fetch::<AuthorityProfileRecord>(
            Select::from(Table::AuthorityProfile).filter(Predicate::eq("role", "faculty")),
        ),
        scoped.fetch::<AttendanceRecord>(Select::from(Table::Attendance)),
        scoped.fetch::<AnnouncementRecord>(Select::from(Table::Announcement)),
    )?;

    let present = attendance.iter().filter(|a| a.status == "present").count() as u64;

    let mut by_year: BTreeMap<String, u64> = (1..=4).map(|y: u8| (y.to_string(), 0)).collect();
    for student in &students {
        if let Some(year) = year_of_semester(student.semester) {
            *by_year.entry(year.to_string()).or_default() += 1;
        }
    }

    Ok(Json(json!({
        "department": scoped.context().department(),
        "total_students": students.len(),
        "total_faculty": faculty.iter().filter(|f| f.is_active()).count(),
        "attendance_rate": percentage(present, attendance.len() as u64),
        "total_announcements": announcements.len(),
        "students_by_year": by_year,
    })))
}
