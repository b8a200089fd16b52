use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::info;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "edu_sync".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "campus".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define tables and indexes. Safe to run repeatedly.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        "DEFINE TABLE IF NOT EXISTS student SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS student_uid ON TABLE student COLUMNS uid UNIQUE;
         DEFINE INDEX IF NOT EXISTS student_code ON TABLE student COLUMNS student_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS student_department ON TABLE student COLUMNS department;",

        "DEFINE TABLE IF NOT EXISTS wallet_transaction SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS wallet_transaction_student ON TABLE wallet_transaction COLUMNS student_record_id;",

        "DEFINE TABLE IF NOT EXISTS announcement SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS announcement_department ON TABLE announcement COLUMNS department;",

        "DEFINE TABLE IF NOT EXISTS hostel_room SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS hostel_room_number ON TABLE hostel_room COLUMNS room_number;",

        "DEFINE TABLE IF NOT EXISTS book_issuance SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS book_issuance_student ON TABLE book_issuance COLUMNS student_record_id;",

        "DEFINE TABLE IF NOT EXISTS attendance SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS attendance_department ON TABLE attendance COLUMNS department;",

        // Gateway tables
        "DEFINE TABLE IF NOT EXISTS authority_profile SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS authority_profile_user ON TABLE authority_profile COLUMNS user_id;",

        "DEFINE TABLE IF NOT EXISTS revoked_session SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS revoked_session_digest ON TABLE revoked_session COLUMNS digest UNIQUE;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    info!("Database schema ensured");
    Ok(())
}
