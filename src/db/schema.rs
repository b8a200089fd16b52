use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

/// Tables known to the gateway.
///
/// `AuthorityProfile` and `RevokedSession` are read by the gateway itself;
/// every other table holds domain records that are only reachable through a
/// scoped executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Student,
    Transaction,
    Announcement,
    HostelRoom,
    BookIssuance,
    Attendance,
    AuthorityProfile,
    RevokedSession,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Transaction => "wallet_transaction",
            Self::Announcement => "announcement",
            Self::HostelRoom => "hostel_room",
            Self::BookIssuance => "book_issuance",
            Self::Attendance => "attendance",
            Self::AuthorityProfile => "authority_profile",
            Self::RevokedSession => "revoked_session",
        }
    }

    /// Whether rows carry a `department` column that department scopes filter on.
    pub fn is_departmental(&self) -> bool {
        matches!(
            self,
            Self::Student | Self::Announcement | Self::Attendance | Self::AuthorityProfile
        )
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed view over rows of one table.
pub trait Record: Serialize + DeserializeOwned + Send {
    const TABLE: Table;
}

/// Persisted student record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentRecord {
    /// Record key (UUID).
    pub id: String,
    /// Institution-assigned identifier, unique across students.
    pub student_id: String,
    pub name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub department: String,
    /// Current semester, 1 through 8.
    pub semester: i64,
    /// Fee charged at registration.
    pub fee_amount: Option<f64>,
    /// One of `unpaid`, `partial`, `paid`.
    pub fee_status: String,
    /// Free-form markers such as `hostel_resident`.
    pub tags: Vec<String>,
    pub room_number: Option<String>,
    pub cgpa: Option<f64>,
    /// `placed`, `in_process` or absent.
    pub placement_status: Option<String>,
    pub company: Option<String>,
    /// Principal that registered the student.
    pub registered_by: Option<String>,
    pub created_at: Option<String>,
}

impl Record for StudentRecord {
    const TABLE: Table = Table::Student;
}

/// Persisted wallet/fee transaction. Debits are negative amounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionRecord {
    pub id: String,
    /// Record key of the owning student.
    pub student_record_id: String,
    pub amount: f64,
    /// `debit` or `credit`.
    #[serde(rename = "type")]
    pub kind: String,
    /// `pending`, `completed` or `failed`.
    pub status: String,
    pub description: Option<String>,
    pub created_at: Option<String>,
}

impl Record for TransactionRecord {
    const TABLE: Table = Table::Transaction;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnouncementRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    /// `low`, `normal` or `high`.
    pub priority: String,
    /// Owning department; absent for institution-wide announcements.
    pub department: Option<String>,
    pub audience: Option<String>,
    pub author_id: String,
    pub author_role: String,
    pub created_at: Option<String>,
}

impl Record for AnnouncementRecord {
    const TABLE: Table = Table::Announcement;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomRecord {
    pub id: String,
    pub room_number: String,
    pub block: Option<String>,
    pub floor: Option<i64>,
    pub room_type: Option<String>,
    pub capacity: i64,
    pub current_occupancy: i64,
}

impl Record for RoomRecord {
    const TABLE: Table = Table::HostelRoom;
}

/// A library book lent to a student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceRecord {
    pub id: String,
    pub book_title: String,
    pub book_isbn: Option<String>,
    pub student_record_id: Option<String>,
    pub student_code: Option<String>,
    pub student_name: Option<String>,
    /// RFC 3339 timestamps (date-only values are accepted as midnight UTC).
    pub issued_at: Option<String>,
    pub due_date: Option<String>,
    /// Set once the book is back; an issuance with this set is never overdue.
    pub returned_at: Option<String>,
}

impl Record for IssuanceRecord {
    const TABLE: Table = Table::BookIssuance;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_record_id: String,
    pub department: String,
    pub date: String,
    /// `present` or `absent`.
    pub status: String,
}

impl Record for AttendanceRecord {
    const TABLE: Table = Table::Attendance;
}

/// Role and department assignment for an authority principal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityProfileRecord {
    pub id: String,
    /// Principal id (token subject) this profile belongs to.
    pub user_id: String,
    /// Raw role string; parsed against the closed role set when authorizing.
    pub role: String,
    pub department: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub designation: Option<String>,
    /// Missing means active.
    pub active: Option<bool>,
    pub updated_at: Option<String>,
}

impl AuthorityProfileRecord {
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }
}

impl Record for AuthorityProfileRecord {
    const TABLE: Table = Table::AuthorityProfile;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevokedSessionRecord {
    pub id: String,
    /// SHA-256 digest of the revoked credential.
    pub digest: String,
    pub principal_id: String,
    pub revoked_at: String,
    /// Token `exp` (Unix seconds). Once it has passed the row can go.
    pub expires_at: Option<i64>,
}

impl Record for RevokedSessionRecord {
    const TABLE: Table = Table::RevokedSession;
}
