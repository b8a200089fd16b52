//! The authenticated caller of one request.

use crate::types::PrincipalId;
use serde::{Deserialize, Serialize};

/// Identity resolved from a session credential.
///
/// Built once by the session resolver and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    id: PrincipalId,
    email: Option<String>,
}

impl Principal {
    pub fn new(id: PrincipalId, email: Option<String>) -> Self {
        Self { id, email }
    }

    pub fn id(&self) -> &PrincipalId {
        &self.id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}
