use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{Principal, Role};
use crate::db::{AuthorityProfileRecord, Predicate, Select, Store, Table, decode_rows};
use crate::error::{GatewayError, StoreError};
use crate::gateway::executor::ScopedExecutor;
use crate::gateway::scope::{Access, Constraint, Scope, ScopeContext};
use crate::types::PrincipalId;

/// Turns a principal plus an access declaration into a scoped executor.
#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn Store>,
}

impl Authorizer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn authorize(
        &self,
        principal: Principal,
        access: &Access,
    ) -> Result<ScopedExecutor, GatewayError> {
        let profile = self
            .active_profile(principal.id())
            .await?
            .ok_or(GatewayError::ProfileNotFound)?;

        let role: Role = profile.role.parse().map_err(|_| GatewayError::RoleMismatch {
            role: profile.role.clone(),
        })?;
        if !access.allows(role) {
            return Err(GatewayError::RoleMismatch {
                role: role.to_string(),
            });
        }

        let constraint = match access.scope {
            Scope::Unscoped => Constraint::Unscoped,
            Scope::Department => {
                let department = profile
                    .department
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or(GatewayError::ScopeUnavailable)?;
                Constraint::Department(department.to_string())
            }
            Scope::Tag(tag) => Constraint::Tag(tag),
            Scope::OwnRecord => Constraint::OwnRecord(principal.id().to_string()),
        };

        debug!(
            principal = %principal.id(),
            role = %role,
            constraint = ?constraint,
            "Request authorized"
        );

        let context = ScopeContext::new(principal, role, profile, constraint);
        Ok(ScopedExecutor::new(self.store.clone(), context))
    }

    /// The principal's active profile. Inactive rows are ignored.
    pub async fn active_profile(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<AuthorityProfileRecord>, StoreError> {
        let rows = self
            .store
            .select(
                Select::from(Table::AuthorityProfile)
                    .filter(Predicate::eq("user_id", principal_id.as_str())),
            )
            .await?;

        let mut active: Vec<AuthorityProfileRecord> = decode_rows(rows)?
            .into_iter()
            .filter(AuthorityProfileRecord::is_active)
            .collect();

        if active.len() > 1 {
            warn!(
                principal = %principal_id,
                count = active.len(),
                "Multiple active profiles; using the first"
            );
        }

        Ok(if active.is_empty() {
            None
        } else {
            Some(active.swap_remove(0))
        })
    }
}
