//! Tenant-level user roles.

use serde::{Deserialize, Serialize};

/// Role of a user within a tenant.
///
/// Roles are ordered: Visitor < Collaborator < Administrator. Accounts created
/// through federated sign-in always start as [`Role::Visitor`].
///
/// # Examples
///
/// ```
/// use feedback_org::Role;
///
/// assert!(Role::Collaborator > Role::Visitor);
/// ```
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can post and vote
    #[default]
    Visitor = 1,

    /// Can moderate and respond to feedback
    Collaborator = 2,

    /// Full control over the tenant
    Administrator = 3,
}

impl Role {
    /// Get the role as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Visitor => "visitor",
            Role::Collaborator => "collaborator",
            Role::Administrator => "administrator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
