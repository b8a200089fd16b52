//! The closed set of authority roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Accountant,
    Hod,
    Hostel,
    Librarian,
    Tnp,
    Administrator,
    Faculty,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Accountant,
        Role::Hod,
        Role::Hostel,
        Role::Librarian,
        Role::Tnp,
        Role::Administrator,
        Role::Faculty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accountant => "accountant",
            Self::Hod => "hod",
            Self::Hostel => "hostel",
            Self::Librarian => "librarian",
            Self::Tnp => "tnp",
            Self::Administrator => "administrator",
            Self::Faculty => "faculty",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Exact, case-sensitive match. Stored roles are lowercase; anything else
    /// is rejected rather than normalized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
