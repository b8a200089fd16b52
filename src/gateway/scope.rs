//! Access declarations and the per-request scope derived from them.

use serde_json::Value;

use crate::auth::{Principal, Role};
use crate::db::{AuthorityProfileRecord, Predicate, Row, Table};

/// The kind of constraint an operation applies to its queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Institution-wide access.
    Unscoped,
    /// Limited to the caller's department.
    Department,
    /// Limited to students carrying the tag.
    Tag(&'static str),
    /// Limited to the caller's own profile.
    OwnRecord,
}

/// What an operation requires: a closed role allow-list and a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub roles: &'static [Role],
    pub scope: Scope,
}

impl Access {
    pub const fn unscoped(roles: &'static [Role]) -> Self {
        Self {
            roles,
            scope: Scope::Unscoped,
        }
    }

    pub const fn department(roles: &'static [Role]) -> Self {
        Self {
            roles,
            scope: Scope::Department,
        }
    }

    pub const fn tagged(roles: &'static [Role], tag: &'static str) -> Self {
        Self {
            roles,
            scope: Scope::Tag(tag),
        }
    }

    pub const fn own_record(roles: &'static [Role]) -> Self {
        Self {
            roles,
            scope: Scope::OwnRecord,
        }
    }

    /// Exact membership test; there is no role hierarchy.
    pub fn allows(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// A scope bound to the values it filters by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Unscoped,
    Department(String),
    Tag(&'static str),
    OwnRecord(String),
}

impl Constraint {
    /// Filter the constraint adds to reads and writes on `table`, if any.
    pub fn predicate(&self, table: Table) -> Option<Predicate> {
        match self {
            Self::Department(department) if table.is_departmental() => {
                Some(Predicate::eq("department", department.as_str()))
            }
            Self::Tag(tag) if table == Table::Student => Some(Predicate::contains("tags", *tag)),
            Self::OwnRecord(user_id) if table == Table::AuthorityProfile => {
                Some(Predicate::eq("user_id", user_id.as_str()))
            }
            _ => None,
        }
    }

    /// Force rows written to `table` into the constraint.
    pub fn stamp(&self, table: Table, row: &mut Row) {
        match self {
            Self::Department(department) if table.is_departmental() => {
                row.insert("department".into(), Value::String(department.clone()));
            }
            Self::Tag(tag) if table == Table::Student => {
                let tags = row
                    .entry("tags")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !tags.is_array() {
                    *tags = Value::Array(Vec::new());
                }
                if let Value::Array(items) = tags
                    && !items.iter().any(|t| t.as_str() == Some(*tag))
                {
                    items.push(Value::String((*tag).to_string()));
                }
            }
            Self::OwnRecord(user_id) if table == Table::AuthorityProfile => {
                row.insert("user_id".into(), Value::String(user_id.clone()));
            }
            _ => {}
        }
    }
}

/// Request-scoped result of authorization. Never persisted.
#[derive(Debug, Clone)]
pub struct ScopeContext {
    principal: Principal,
    role: Role,
    profile: AuthorityProfileRecord,
    constraint: Constraint,
}

impl ScopeContext {
    pub(crate) fn new(
        principal: Principal,
        role: Role,
        profile: AuthorityProfileRecord,
        constraint: Constraint,
    ) -> Self {
        Self {
            principal,
            role,
            profile,
            constraint,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn department(&self) -> Option<&str> {
        self.profile.department.as_deref().filter(|d| !d.trim().is_empty())
    }

    /// The caller's own authority profile.
    pub fn profile(&self) -> &AuthorityProfileRecord {
        &self.profile
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_access_membership_is_exact() {
        let access = Access::unscoped(&[Role::Hostel]);
        assert!(access.allows(Role::Hostel));
        assert!(!access.allows(Role::Administrator));
        assert!(!access.allows(Role::Hod));
    }

    #[test]
    fn test_department_constraint_only_on_departmental_tables() {
        let constraint = Constraint::Department("CS".into());
        assert_eq!(
            constraint.predicate(Table::Student),
            Some(Predicate::eq("department", "CS"))
        );
        assert_eq!(constraint.predicate(Table::HostelRoom), None);
    }

    #[test]
    fn test_tag_constraint() {
        let constraint = Constraint::Tag("hostel_resident");
        assert_eq!(
            constraint.predicate(Table::Student),
            Some(Predicate::contains("tags", "hostel_resident"))
        );
        assert_eq!(constraint.predicate(Table::Announcement), None);
    }

    #[test]
    fn test_own_record_constraint() {
        let constraint = Constraint::OwnRecord("u-9".into());
        assert_eq!(
            constraint.predicate(Table::AuthorityProfile),
            Some(Predicate::eq("user_id", "u-9"))
        );
        assert_eq!(Constraint::Unscoped.predicate(Table::AuthorityProfile), None);
    }

    #[test]
    fn test_stamp_overrides_department() {
        let constraint = Constraint::Department("CS".into());
        let mut row = json!({ "title": "Exam", "department": "EE" })
            .as_object()
            .cloned()
            .unwrap();
        constraint.stamp(Table::Announcement, &mut row);
        assert_eq!(row["department"], "CS");

        let mut room = Row::new();
        constraint.stamp(Table::HostelRoom, &mut room);
        assert!(room.get("department").is_none());
    }

    #[test]
    fn test_stamp_adds_tag_once() {
        let constraint = Constraint::Tag("hostel_resident");
        let mut row = json!({ "tags": ["hostel_resident", "sports"] })
            .as_object()
            .cloned()
            .unwrap();
        constraint.stamp(Table::Student, &mut row);
        assert_eq!(row["tags"], json!(["hostel_resident", "sports"]));

        let mut bare = Row::new();
        constraint.stamp(Table::Student, &mut bare);
        assert_eq!(bare["tags"], json!(["hostel_resident"]));
    }

    #[test]
    fn test_stamp_pins_owner() {
        let constraint = Constraint::OwnRecord("u-1".into());
        let mut row = json!({ "user_id": "someone-else", "phone": "1" })
            .as_object()
            .cloned()
            .unwrap();
        constraint.stamp(Table::AuthorityProfile, &mut row);
        assert_eq!(row["user_id"], "u-1");
    }
}
