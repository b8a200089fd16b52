//! Fixtures shared by unit and router tests.

use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};

use crate::db::{
    DatabaseConfig, Db, Insert, Store, SurrealStore, Table, create_connection, ensure_schema,
};
use crate::types::RecordKey;

pub const TEST_SECRET: &str = "edu-sync-test-secret";

pub async fn setup_test_db() -> Db {
    let config = DatabaseConfig {
        url: "memory".to_string(),
        ..Default::default()
    };
    let db = create_connection(config).await.unwrap();
    ensure_schema(&db).await.unwrap();
    db
}

pub async fn memory_store() -> Arc<SurrealStore> {
    Arc::new(SurrealStore::new(setup_test_db().await))
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// HS256 token for `sub` valid for an hour, signed with `TEST_SECRET`.
pub fn mint_token(sub: &str, email: &str) -> String {
    mint_token_with(
        TEST_SECRET,
        json!({ "sub": sub, "email": email, "exp": now_secs() + 3600 }),
    )
}

pub fn mint_token_with(secret: &str, claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

/// Insert raw JSON rows, generating an `id` for rows without one.
pub async fn seed(store: &dyn Store, table: Table, rows: Value) {
    let Value::Array(rows) = rows else {
        panic!("seed expects an array of rows");
    };
    for row in rows {
        let Value::Object(mut row) = row else {
            panic!("seed rows must be objects");
        };
        row.entry("id")
            .or_insert_with(|| Value::String(RecordKey::generate().into_inner()));
        store.insert(Insert { table, row }).await.unwrap();
    }
}

pub async fn seed_profile(store: &dyn Store, user_id: &str, role: &str, department: Option<&str>) {
    seed(
        store,
        Table::AuthorityProfile,
        json!([{
            "user_id": user_id,
            "role": role,
            "department": department,
            "first_name": "Test",
            "last_name": role,
            "email": format!("{}@campus.edu", user_id),
        }]),
    )
    .await;
}
