use axum::{
    Json, Router,
    extract::{
        Path, Query,
        rejection::{PathRejection, QueryRejection},
    },
    routing::get,
};
use serde_json::{Value, json};

use crate::api::{ApiResult, ListParams, data, path_param, query_params, with_fields};
use crate::db::{Predicate, RoomRecord, Select, StudentRecord, Table};
use crate::error::GatewayError;
use crate::format::{display_name, occupancy_rate};
use crate::gateway::policy::{HostelResidents, HostelWarden};
use crate::gateway::{AppState, Scoped};

const RESIDENT_SEARCH_FIELDS: [&str; 4] = ["name", "student_id", "email", "room_number"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hostel/rooms", get(rooms))
        .route("/hostel/stats", get(stats))
        .route("/hostel/student/{id}", get(student))
        .route("/hostel/students/search", get(search_students))
}

fn room_view(room: &RoomRecord) -> Result<Value, GatewayError> {
    let available = (room.capacity - room.current_occupancy).max(0);
    with_fields(
        room,
        json!({
            "occupancy_rate": occupancy_rate(room.current_occupancy, room.capacity),
            "available_beds": available,
            "status": if available == 0 { "full" } else { "available" },
        }),
    )
}

fn resident_view(student: &StudentRecord) -> Result<Value, GatewayError> {
    with_fields(
        student,
        json!({
            "display_name": display_name(
                student.first_name.as_deref(),
                student.last_name.as_deref(),
                Some(&student.name),
                Some(&student.email),
            ),
        }),
    )
}

async fn rooms(
    scoped: Scoped<HostelWarden>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let query = Select::from(Table::HostelRoom)
        .filter_opt(params.block().map(|block| Predicate::eq("block", block)))
        .filter_opt(Predicate::search(&["room_number"], params.search()))
        .order_by("room_number")
        .limit(params.limit()?);

    let rooms = scoped.fetch::<RoomRecord>(query).await?;
    let rows = rooms
        .iter()
        .map(room_view)
        .collect::<Result<Vec<_>, _>>()?;

    data(rows)
}

async fn stats(scoped: Scoped<HostelResidents>) -> ApiResult {
    let (rooms, residents) = tokio::try_join!(
        scoped.fetch::<RoomRecord>(Select::from(Table::HostelRoom)),
        scoped.fetch::<StudentRecord>(Select::from(Table::Student)),
    )?;

    let capacity: i64 = rooms.iter().map(|r| r.capacity.max(0)).sum();
    let occupancy: i64 = rooms.iter().map(|r| r.current_occupancy.max(0)).sum();
    let full_rooms = rooms
        .iter()
        .filter(|r| r.capacity > 0 && r.current_occupancy >= r.capacity)
        .count();

    Ok(Json(json!({
        "total_rooms": rooms.len(),
        "total_capacity": capacity,
        "current_occupancy": occupancy,
        "occupancy_rate": occupancy_rate(occupancy, capacity),
        "available_beds": (capacity - occupancy).max(0),
        "full_rooms": full_rooms,
        "total_residents": residents.len(),
    })))
}

/// One resident, by record id or institution student id.
async fn student(
    scoped: Scoped<HostelResidents>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult {
    let id = path_param(id)?;
    let by_key = scoped
        .fetch_one::<StudentRecord>(
            Select::from(Table::Student).filter(Predicate::eq("id", id.as_str())),
        )
        .await?;

    let found = match by_key {
        Some(student) => Some(student),
        None => {
            scoped
                .fetch_one::<StudentRecord>(
                    Select::from(Table::Student).filter(Predicate::eq("student_id", id.as_str())),
                )
                .await?
        }
    };

    match found {
        Some(student) => data(resident_view(&student)?),
        None => Err(GatewayError::not_found("Student not found")),
    }
}

async fn search_students(
    scoped: Scoped<HostelResidents>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let query = Select::from(Table::Student)
        .filter_opt(Predicate::search(&RESIDENT_SEARCH_FIELDS, params.search()))
        .order_by("name")
        .limit(params.limit()?);

    let residents = scoped.fetch::<StudentRecord>(query).await?;
    let rows = residents
        .iter()
        .map(resident_view)
        .collect::<Result<Vec<_>, _>>()?;

    data(rows)
}
