//! End-to-end router tests over the in-memory database.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use chrono::{Duration, Utc};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::api::create_router;
use crate::auth::{AuthConfig, DemoSessionStore, JwtSessionStore};
use crate::config::StatsConfig;
use crate::db::{
    Delete, DemoStore, Insert, Row, Select, Store, StoreFuture, SurrealStore, Table, Update,
};
use crate::gateway::AppState;
use crate::testing::{TEST_SECRET, memory_store, mint_token, seed, seed_profile};

/// Store wrapper that remembers which tables were touched.
struct RecordingStore {
    inner: Arc<dyn Store>,
    touched: Mutex<Vec<Table>>,
}

impl RecordingStore {
    fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            touched: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, table: Table) {
        self.touched.lock().unwrap().push(table);
    }

    fn touched(&self) -> Vec<Table> {
        self.touched.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.touched.lock().unwrap().clear();
    }

    fn touched_domain_tables(&self) -> bool {
        self.touched()
            .iter()
            .any(|t| !matches!(t, Table::AuthorityProfile | Table::RevokedSession))
    }
}

impl Store for RecordingStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn select(&self, query: Select) -> StoreFuture<'_, Vec<Row>> {
        self.record(query.table);
        self.inner.select(query)
    }

    fn insert(&self, insert: Insert) -> StoreFuture<'_, Row> {
        self.record(insert.table);
        self.inner.insert(insert)
    }

    fn insert_all(&self, inserts: Vec<Insert>) -> StoreFuture<'_, Vec<Row>> {
        for insert in &inserts {
            self.record(insert.table);
        }
        self.inner.insert_all(inserts)
    }

    fn update(&self, update: Update) -> StoreFuture<'_, Vec<Row>> {
        self.record(update.table);
        self.inner.update(update)
    }

    fn delete(&self, delete: Delete) -> StoreFuture<'_, Vec<Row>> {
        self.record(delete.table);
        self.inner.delete(delete)
    }
}

struct Harness {
    app: Router,
    store: Arc<SurrealStore>,
    recorder: Arc<RecordingStore>,
}

impl Harness {
    async fn new() -> Self {
        let store = memory_store().await;
        let recorder = Arc::new(RecordingStore::new(store.clone()));
        let sessions =
            JwtSessionStore::new(AuthConfig::with_secret(TEST_SECRET), recorder.clone()).unwrap();
        let state = AppState::new(recorder.clone(), Arc::new(sessions), StatsConfig::default());

        Self {
            app: create_router(state),
            store,
            recorder,
        }
    }

    /// Seed a profile and return a token for it.
    async fn login(&self, user_id: &str, role: &str, department: Option<&str>) -> String {
        seed_profile(self.store.as_ref(), user_id, role, department).await;
        mint_token(user_id, &format!("{}@campus.edu", user_id))
    }

    async fn rows(&self, table: Table) -> Vec<Row> {
        self.store.select(Select::from(table)).await.unwrap()
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        send(&self.app, Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        send(&self.app, Method::POST, uri, token, Some(body)).await
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn register_body() -> Value {
    json!({
        "name": "Jane Doe",
        "email": "jane@x.edu",
        "phone": "123",
        "department": "CS",
        "semester": "3",
        "student_id": "S100",
        "fee_amount": "500"
    })
}

const GATED_ROUTES: [(&str, &str); 19] = [
    ("GET", "/auth/me"),
    ("POST", "/auth/logout"),
    ("POST", "/accountant/register-student"),
    ("GET", "/accountant/stats"),
    ("GET", "/accountant/transactions"),
    ("GET", "/hod/students"),
    ("GET", "/hod/announcements"),
    ("POST", "/hod/announcements"),
    ("DELETE", "/hod/announcements/abc"),
    ("GET", "/hod/stats"),
    ("GET", "/hostel/rooms"),
    ("GET", "/hostel/stats"),
    ("GET", "/hostel/student/abc"),
    ("GET", "/hostel/students/search"),
    ("GET", "/librarian/issued-records"),
    ("GET", "/librarian/stats"),
    ("GET", "/tnp/students"),
    ("GET", "/tnp/stats"),
    ("GET", "/faculty/profile?id=x"),
];

#[tokio::test]
async fn test_health_is_public() {
    let h = Harness::new().await;
    let (status, body) = h.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["mode"], "surrealdb");
}

#[tokio::test]
async fn test_missing_credential_is_401_without_store_access() {
    let h = Harness::new().await;

    for (method, path) in GATED_ROUTES {
        let method: Method = method.parse().unwrap();
        let body = (method != Method::GET).then(|| json!({}));
        let (status, response) = send(&h.app, method, path, None, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", path);
        assert_eq!(response, json!({ "error": "Unauthorized" }), "{}", path);
    }

    assert!(h.recorder.touched().is_empty());
}

#[tokio::test]
async fn test_invalid_token_is_401() {
    let h = Harness::new().await;
    let (status, _) = h.get("/accountant/stats", Some("garbage.token.value")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!h.recorder.touched_domain_tables());
}

#[tokio::test]
async fn test_wrong_role_is_403_before_primary_query() {
    let h = Harness::new().await;
    let token = h.login("lib-1", "librarian", None).await;
    h.recorder.clear();

    let (status, body) = h.get("/accountant/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "Access denied" }));

    let (status, _) = h
        .post("/accountant/register-student", Some(&token), register_body())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(!h.recorder.touched_domain_tables());
    assert!(h.rows(Table::Student).await.is_empty());
}

#[tokio::test]
async fn test_missing_profile_is_403() {
    let h = Harness::new().await;
    let token = mint_token("nobody", "nobody@campus.edu");

    let (status, body) = h.get("/hostel/rooms", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access denied");
}

#[tokio::test]
async fn test_register_student_creates_record_and_pending_debit() {
    let h = Harness::new().await;
    let token = h.login("acct-1", "accountant", None).await;

    let (status, body) = h
        .post("/accountant/register-student", Some(&token), register_body())
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let student = &body["data"];
    assert_eq!(student["fee_status"], "unpaid");
    assert_eq!(student["student_id"], "S100");
    assert_eq!(student["semester"], 3);
    assert_eq!(student["department"], "CS");
    assert_eq!(student["registered_by"], "acct-1");
    assert!(body["message"].is_string());

    let students = h.rows(Table::Student).await;
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["id"], student["id"]);

    let transactions = h.rows(Table::Transaction).await;
    assert_eq!(transactions.len(), 1);
    let debit = &transactions[0];
    assert_eq!(debit["amount"].as_f64(), Some(-500.0));
    assert_eq!(debit["type"], "debit");
    assert_eq!(debit["status"], "pending");
    assert_eq!(debit["student_record_id"], student["id"]);
}

#[tokio::test]
async fn test_register_without_fee_is_paid_and_has_no_debit() {
    let h = Harness::new().await;
    let token = h.login("acct-1", "accountant", None).await;

    let mut body = register_body();
    body.as_object_mut().unwrap().remove("fee_amount");
    let (status, response) = h
        .post("/accountant/register-student", Some(&token), body)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["fee_status"], "paid");
    assert!(h.rows(Table::Transaction).await.is_empty());
}

#[tokio::test]
async fn test_duplicate_student_is_400_without_new_rows() {
    let h = Harness::new().await;
    let token = h.login("acct-1", "accountant", None).await;

    let (status, _) = h
        .post("/accountant/register-student", Some(&token), register_body())
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h
        .post("/accountant/register-student", Some(&token), register_body())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already exists"));

    assert_eq!(h.rows(Table::Student).await.len(), 1);
    assert_eq!(h.rows(Table::Transaction).await.len(), 1);
}

#[tokio::test]
async fn test_register_validation_errors() {
    let h = Harness::new().await;
    let token = h.login("acct-1", "accountant", None).await;

    let mut missing_email = register_body();
    missing_email["email"] = json!("   ");
    let (status, body) = h
        .post("/accountant/register-student", Some(&token), missing_email)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required field: email");

    let mut bad_semester = register_body();
    bad_semester["semester"] = json!(9);
    let (status, _) = h
        .post("/accountant/register-student", Some(&token), bad_semester)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut negative_fee = register_body();
    negative_fee["fee_amount"] = json!(-10);
    let (status, _) = h
        .post("/accountant/register-student", Some(&token), negative_fee)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(h.rows(Table::Student).await.is_empty());
}

#[tokio::test]
async fn test_accountant_stats() {
    let h = Harness::new().await;
    let token = h.login("acct-1", "accountant", None).await;

    let (_, body) = h.get("/accountant/stats", Some(&token)).await;
    assert_eq!(body["total_students"], 0);
    assert_eq!(body["collection_rate"], 0);

    seed(
        h.store.as_ref(),
        Table::Student,
        json!([
            { "student_id": "S1", "name": "A", "fee_status": "paid", "fee_amount": 1000.0 },
            { "student_id": "S2", "name": "B", "fee_status": "unpaid", "fee_amount": 500.0 },
            { "student_id": "S3", "name": "C", "fee_status": "unpaid" }
        ]),
    )
    .await;
    seed(
        h.store.as_ref(),
        Table::Transaction,
        json!([
            { "student_record_id": "x", "amount": 1000.0, "type": "credit", "status": "completed" },
            { "student_record_id": "y", "amount": -500.0, "type": "debit", "status": "pending" }
        ]),
    )
    .await;

    let (status, body) = h.get("/accountant/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_students"], 3);
    assert_eq!(body["paid_students"], 1);
    assert_eq!(body["unpaid_students"], 2);
    assert_eq!(body["collection_rate"], 33);
    assert_eq!(body["collected_amount"].as_f64(), Some(1000.0));
    assert_eq!(body["pending_dues"].as_f64(), Some(500.0));
    assert_eq!(body["expected_fees"].as_f64(), Some(51500.0));
    assert_eq!(body["transaction_count"], 2);
}

async fn seed_department_students(h: &Harness) {
    seed(
        h.store.as_ref(),
        Table::Student,
        json!([
            { "student_id": "CS1", "name": "Jane Doe", "email": "jane@x.edu", "department": "CS", "semester": 3 },
            { "student_id": "CS2", "name": "Ravi Kumar", "email": "ravi@x.edu", "department": "CS", "semester": 5 },
            { "student_id": "EE1", "name": "Janet Lee", "email": "janet@x.edu", "department": "EE", "semester": 3 }
        ]),
    )
    .await;
}

#[tokio::test]
async fn test_hod_sees_only_own_department() {
    let h = Harness::new().await;
    let token = h.login("hod-cs", "hod", Some("CS")).await;
    seed_department_students(&h).await;

    let (status, body) = h.get("/hod/students", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let students = body["data"].as_array().unwrap();
    assert_eq!(students.len(), 2);
    assert!(students.iter().all(|s| s["department"] == "CS"));

    // A department parameter cannot widen the scope
    let (_, body) = h.get("/hod/students?department=EE", Some(&token)).await;
    assert!(body["data"].as_array().unwrap().iter().all(|s| s["department"] == "CS"));

    let (_, body) = h.get("/hod/students?search=JAN", Some(&token)).await;
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["student_id"], "CS1");
    assert_eq!(found[0]["display_name"], "Jane Doe");

    let (_, body) = h.get("/hod/students?year=3", Some(&token)).await;
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["student_id"], "CS2");
    assert_eq!(found[0]["year"], 3);

    let (status, _) = h.get("/hod/students?year=7", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_hod_without_department_is_403() {
    let h = Harness::new().await;
    let token = h.login("hod-x", "hod", None).await;
    h.recorder.clear();

    let (status, _) = h.get("/hod/students", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!h.recorder.touched_domain_tables());
}

#[tokio::test]
async fn test_hod_announcements_are_department_bound() {
    let h = Harness::new().await;
    let token = h.login("hod-cs", "hod", Some("CS")).await;
    seed(
        h.store.as_ref(),
        Table::Announcement,
        json!([{ "id": "ee-note", "title": "EE lab", "content": "Closed", "department": "EE", "author_role": "hod" }]),
    )
    .await;

    let (status, body) = h
        .post(
            "/hod/announcements",
            Some(&token),
            json!({ "title": "Exams", "content": "Start Monday", "department": "EE", "priority": "HIGH" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["department"], "CS");
    assert_eq!(body["data"]["priority"], "high");
    assert_eq!(body["data"]["author_id"], "hod-cs");

    let (_, body) = h.get("/hod/announcements", Some(&token)).await;
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["title"], "Exams");

    let (status, _) = h
        .post("/hod/announcements", Some(&token), json!({ "title": "No body" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Another department's announcement is invisible, so it cannot be deleted
    let response = send(
        &h.app,
        Method::DELETE,
        "/hod/announcements/ee-note",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.0, StatusCode::NOT_FOUND);
    assert_eq!(h.rows(Table::Announcement).await.len(), 2);

    let own_id = listed[0]["id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &h.app,
        Method::DELETE,
        &format!("/hod/announcements/{}", own_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], own_id.as_str());
    assert_eq!(h.rows(Table::Announcement).await.len(), 1);
}

#[tokio::test]
async fn test_hod_stats() {
    let h = Harness::new().await;
    let token = h.login("hod-cs", "hod", Some("CS")).await;
    seed_department_students(&h).await;
    seed_profile(h.store.as_ref(), "fac-1", "faculty", Some("CS")).await;
    seed_profile(h.store.as_ref(), "fac-2", "faculty", Some("EE")).await;
    seed(
        h.store.as_ref(),
        Table::Attendance,
        json!([
            { "student_record_id": "a", "department": "CS", "date": "2026-03-01", "status": "present" },
            { "student_record_id": "a", "department": "CS", "date": "2026-03-02", "status": "present" },
            { "student_record_id": "a", "department": "CS", "date": "2026-03-03", "status": "absent" },
            { "student_record_id": "b", "department": "EE", "date": "2026-03-01", "status": "absent" }
        ]),
    )
    .await;

    let (status, body) = h.get("/hod/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["department"], "CS");
    assert_eq!(body["total_students"], 2);
    assert_eq!(body["total_faculty"], 1);
    assert_eq!(body["attendance_rate"], 67);
    assert_eq!(body["students_by_year"]["2"], 1);
    assert_eq!(body["students_by_year"]["3"], 1);
    assert_eq!(body["students_by_year"]["1"], 0);
}

async fn seed_hostel(h: &Harness) {
    seed(
        h.store.as_ref(),
        Table::Student,
        json!([
            { "id": "res-1", "student_id": "H1", "name": "Asha Rao", "email": "asha@x.edu", "tags": ["hostel_resident"], "room_number": "A-101" },
            { "id": "day-1", "student_id": "D1", "name": "Arjun Das", "email": "arjun@x.edu", "tags": [] }
        ]),
    )
    .await;
    seed(
        h.store.as_ref(),
        Table::HostelRoom,
        json!([
            { "room_number": "A-101", "block": "A", "capacity": 2, "current_occupancy": 2 },
            { "room_number": "B-201", "block": "B", "capacity": 2, "current_occupancy": 1 }
        ]),
    )
    .await;
}

#[tokio::test]
async fn test_hostel_sees_only_residents() {
    let h = Harness::new().await;
    let token = h.login("warden-1", "hostel", None).await;
    seed_hostel(&h).await;

    let (status, body) = h.get("/hostel/students/search?search=a", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["student_id"], "H1");

    let (status, body) = h.get("/hostel/student/res-1", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["display_name"], "Asha Rao");

    let (status, _) = h.get("/hostel/student/H1", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.get("/hostel/student/day-1", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Student not found");
}

#[tokio::test]
async fn test_hostel_rooms_and_stats() {
    let h = Harness::new().await;
    let token = h.login("warden-1", "hostel", None).await;

    let (_, body) = h.get("/hostel/stats", Some(&token)).await;
    assert_eq!(body["occupancy_rate"], 0);
    assert_eq!(body["total_rooms"], 0);

    seed_hostel(&h).await;

    let (status, body) = h.get("/hostel/rooms?block=B", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let rooms = body["data"].as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["occupancy_rate"], 50);
    assert_eq!(rooms[0]["status"], "available");

    let (_, body) = h.get("/hostel/stats", Some(&token)).await;
    assert_eq!(body["total_rooms"], 2);
    assert_eq!(body["total_capacity"], 4);
    assert_eq!(body["occupancy_rate"], 75);
    assert_eq!(body["available_beds"], 1);
    assert_eq!(body["full_rooms"], 1);
    assert_eq!(body["total_residents"], 1);
}

#[tokio::test]
async fn test_librarian_overdue_classification() {
    let h = Harness::new().await;
    let token = h.login("lib-1", "librarian", None).await;
    let past = (Utc::now() - Duration::days(3)).to_rfc3339();
    let future = (Utc::now() + Duration::days(3)).to_rfc3339();
    seed(
        h.store.as_ref(),
        Table::BookIssuance,
        json!([
            { "book_title": "Rust in Action", "student_record_id": "s1", "due_date": past, "issued_at": "2026-01-01T00:00:00Z" },
            { "book_title": "SICP", "student_record_id": "s1", "due_date": past, "returned_at": past, "issued_at": "2026-01-02T00:00:00Z" },
            { "book_title": "TAOCP", "student_record_id": "s2", "due_date": future, "issued_at": "2026-01-03T00:00:00Z" }
        ]),
    )
    .await;

    let (status, body) = h.get("/librarian/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_issued"], 3);
    assert_eq!(body["active_issues"], 2);
    assert_eq!(body["returned_books"], 1);
    assert_eq!(body["overdue_books"], 1);
    assert_eq!(body["unique_borrowers"], 2);

    let (_, body) = h
        .get("/librarian/issued-records?status=overdue", Some(&token))
        .await;
    let overdue = body["data"].as_array().unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0]["book_title"], "Rust in Action");
    assert_eq!(overdue[0]["is_overdue"], true);

    let (_, body) = h
        .get("/librarian/issued-records?status=returned", Some(&token))
        .await;
    let returned = body["data"].as_array().unwrap();
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0]["is_overdue"], false);

    let (_, body) = h.get("/librarian/issued-records", Some(&token)).await;
    let all = body["data"].as_array().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["book_title"], "TAOCP");

    let (status, _) = h
        .get("/librarian/issued-records?status=lost", Some(&token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tnp_students_search_and_stats() {
    let h = Harness::new().await;
    let token = h.login("tnp-1", "tnp", None).await;

    let (_, body) = h.get("/tnp/stats", Some(&token)).await;
    assert_eq!(body["average_cgpa"].as_f64(), Some(0.0));
    assert_eq!(body["placement_rate"].as_f64(), Some(85.0));

    seed(
        h.store.as_ref(),
        Table::Student,
        json!([
            { "student_id": "T1", "name": "jane roe", "email": "jr@x.edu", "department": "CS", "semester": 7, "cgpa": 8.0, "placement_status": "placed", "company": "Acme" },
            { "student_id": "T2", "name": "Sam Park", "email": "sp@x.edu", "department": "EE", "semester": 3, "cgpa": 7.0 }
        ]),
    )
    .await;

    let (_, body) = h.get("/tnp/students?search=JANE", Some(&token)).await;
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["eligible"], true);

    let (_, body) = h.get("/tnp/students?search=", Some(&token)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = h.get("/tnp/students?department=EE", Some(&token)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = h.get("/tnp/students?limit=abc", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = h.get("/tnp/stats", Some(&token)).await;
    assert_eq!(body["total_students"], 2);
    assert_eq!(body["eligible_students"], 1);
    assert_eq!(body["placed_students"], 1);
    assert_eq!(body["average_cgpa"].as_f64(), Some(7.5));
    assert_eq!(body["recruiting_companies"], 1);
}

#[tokio::test]
async fn test_tnp_announcements() {
    let h = Harness::new().await;
    let token = h.login("tnp-1", "tnp", None).await;

    let (status, body) = h
        .post(
            "/tnp/announcements",
            Some(&token),
            json!({ "title": "Drive", "content": "Acme on campus", "audience": "final-year" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["author_role"], "tnp");
    assert_eq!(body["data"]["priority"], "normal");

    let (_, body) = h.get("/tnp/announcements", Some(&token)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_repeated_get_is_idempotent() {
    let h = Harness::new().await;
    let token = h.login("hod-cs", "hod", Some("CS")).await;
    seed_department_students(&h).await;

    let first = h.get("/hod/students?search=a", Some(&token)).await;
    let second = h.get("/hod/students?search=a", Some(&token)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_profile_read_rules() {
    let h = Harness::new().await;
    let token = h.login("fac-1", "faculty", Some("ME")).await;
    seed_profile(h.store.as_ref(), "fac-2", "faculty", Some("CS")).await;
    seed_profile(h.store.as_ref(), "hod-1", "hod", Some("CS")).await;

    let (status, body) = h.get("/faculty/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required parameter: id");

    let (status, body) = h.get("/faculty/profile?id=fac-1", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["department"], "ME");
    assert_eq!(body["data"]["display_name"], "Test faculty");

    let (status, _) = h.get("/faculty/profile?id=fac-2", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.get("/hod/profile?id=hod-1", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.get("/faculty/profile?id=ghost", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h.get("/dean/profile?id=fac-1", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_update_is_own_record_only() {
    let h = Harness::new().await;
    let token = h.login("fac-1", "faculty", Some("ME")).await;
    seed_profile(h.store.as_ref(), "fac-2", "faculty", Some("CS")).await;

    let (status, body) = send(
        &h.app,
        Method::PUT,
        "/faculty/profile",
        Some(&token),
        Some(json!({ "phone": " 555-0101 ", "user_id": "fac-2", "role": "administrator" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["phone"], "555-0101");
    assert_eq!(body["data"]["user_id"], "fac-1");
    assert_eq!(body["data"]["role"], "faculty");

    let profiles = h.rows(Table::AuthorityProfile).await;
    let other = profiles.iter().find(|p| p["user_id"] == "fac-2").unwrap();
    assert_ne!(other["phone"], "555-0101");

    let (status, _) = send(
        &h.app,
        Method::PUT,
        "/hod/profile",
        Some(&token),
        Some(json!({ "phone": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &h.app,
        Method::PUT,
        "/faculty/profile",
        Some(&token),
        Some(json!({ "department": "CS" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_me_and_logout() {
    let h = Harness::new().await;
    let token = h.login("acct-1", "accountant", None).await;

    let (status, body) = h.get("/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "acct-1");
    assert_eq!(body["data"]["role"], "accountant");

    let (status, body) = h.post("/auth/logout", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["signed_out"], true);

    let (status, _) = h.get("/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_demo_mode_answers_401() {
    let state = AppState::new(
        Arc::new(DemoStore::new()),
        Arc::new(DemoSessionStore),
        StatsConfig::default(),
    );
    let app = create_router(state);
    let token = mint_token("acct-1", "acct@campus.edu");

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "demo");

    for (method, path) in GATED_ROUTES {
        let method: Method = method.parse().unwrap();
        let body = (method != Method::GET).then(|| json!({}));
        let (status, _) = send(&app, method, path, Some(&token), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", path);
    }
}

#[tokio::test]
async fn test_hod_cannot_delete_announcement_of_another_role() {
    let h = Harness::new().await;
    let hod = h.login("hod-cs", "hod", Some("CS")).await;
    let tnp = h.login("tnp-1", "tnp", None).await;

    let (status, body) = h
        .post(
            "/tnp/announcements",
            Some(&tnp),
            json!({ "title": "Drive", "content": "Acme on campus", "department": "CS" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = h.get("/hod/announcements", Some(&hod)).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = send(
        &h.app,
        Method::DELETE,
        &format!("/hod/announcements/{}", id),
        Some(&hod),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Announcement not found");

    let (_, body) = h.get("/tnp/announcements", Some(&tnp)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_query_string_keeps_error_envelope() {
    let h = Harness::new().await;
    let tnp = h.login("tnp-1", "tnp", None).await;
    let faculty = h.login("fac-1", "faculty", None).await;

    let (status, body) = h.get("/tnp/students?search=a&search=b", Some(&tnp)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid query string"));

    let (status, body) = h.get("/faculty/profile?id=a&id=b", Some(&faculty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Authentication is still decided first
    let (status, body) = h.get("/tnp/students?search=a&search=b", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

/// Store whose student reads lag behind writes, as when a concurrent
/// registration has not yet become visible.
struct LaggingStudentReads {
    inner: Arc<dyn Store>,
}

impl Store for LaggingStudentReads {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn select(&self, query: Select) -> StoreFuture<'_, Vec<Row>> {
        if query.table == Table::Student {
            return Box::pin(async { Ok(Vec::new()) });
        }
        self.inner.select(query)
    }

    fn insert(&self, insert: Insert) -> StoreFuture<'_, Row> {
        self.inner.insert(insert)
    }

    fn insert_all(&self, inserts: Vec<Insert>) -> StoreFuture<'_, Vec<Row>> {
        self.inner.insert_all(inserts)
    }

    fn update(&self, update: Update) -> StoreFuture<'_, Vec<Row>> {
        self.inner.update(update)
    }

    fn delete(&self, delete: Delete) -> StoreFuture<'_, Vec<Row>> {
        self.inner.delete(delete)
    }
}

#[tokio::test]
async fn test_duplicate_student_missed_by_lookup_is_400() {
    let store = memory_store().await;
    let lagging: Arc<dyn Store> = Arc::new(LaggingStudentReads {
        inner: store.clone(),
    });
    let sessions =
        JwtSessionStore::new(AuthConfig::with_secret(TEST_SECRET), lagging.clone()).unwrap();
    let app = create_router(AppState::new(lagging, Arc::new(sessions), StatsConfig::default()));

    seed_profile(store.as_ref(), "acct-1", "accountant", None).await;
    seed(
        store.as_ref(),
        Table::Student,
        json!([{ "student_id": "S100", "name": "Earlier Registration" }]),
    )
    .await;
    let token = mint_token("acct-1", "acct@campus.edu");

    let (status, body) = send(
        &app,
        Method::POST,
        "/accountant/register-student",
        Some(&token),
        Some(register_body()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A student with this ID already exists");

    let students = store.select(Select::from(Table::Student)).await.unwrap();
    assert_eq!(students.len(), 1);
    let transactions = store.select(Select::from(Table::Transaction)).await.unwrap();
    assert!(transactions.is_empty());
}

#[tokio::test]
async fn test_blank_return_date_counts_as_not_returned() {
    let h = Harness::new().await;
    let token = h.login("lib-1", "librarian", None).await;
    let past = (Utc::now() - Duration::days(3)).to_rfc3339();
    let future = (Utc::now() + Duration::days(3)).to_rfc3339();
    seed(
        h.store.as_ref(),
        Table::BookIssuance,
        json!([
            { "book_title": "Dune", "student_record_id": "s1", "due_date": past, "returned_at": "" },
            { "book_title": "Emma", "student_record_id": "s2", "due_date": future, "returned_at": "  " },
            { "book_title": "Ulysses", "student_record_id": "s3", "due_date": past, "returned_at": past }
        ]),
    )
    .await;

    let (_, body) = h
        .get("/librarian/issued-records?status=returned", Some(&token))
        .await;
    let returned = body["data"].as_array().unwrap();
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0]["book_title"], "Ulysses");
    assert_eq!(returned[0]["status"], "returned");

    let (_, body) = h
        .get("/librarian/issued-records?status=issued", Some(&token))
        .await;
    let open = body["data"].as_array().unwrap();
    assert_eq!(open.len(), 2);

    let (_, body) = h
        .get("/librarian/issued-records?status=overdue", Some(&token))
        .await;
    let overdue = body["data"].as_array().unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0]["book_title"], "Dune");

    let (_, body) = h.get("/librarian/stats", Some(&token)).await;
    assert_eq!(body["returned_books"], 1);
    assert_eq!(body["overdue_books"], 1);
}
