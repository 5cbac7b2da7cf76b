//! User and provider-link models
//!
//! A user belongs to exactly one tenant and may carry several provider links.
//! Links are appended by sign-in flows and never removed by them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles::Role;

/// Federated identity provider kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    /// CAS 2.0 single sign-on server
    Cas,
    /// SAML 2.0 identity provider
    Saml,
}

impl ProviderName {
    /// Get the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Cas => "cas",
            ProviderName::Saml => "saml",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cas" => Ok(ProviderName::Cas),
            "saml" => Ok(ProviderName::Saml),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Binding between a user and an external identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderLink {
    /// Which provider issued the identity
    pub provider: ProviderName,

    /// The provider's stable subject identifier
    pub uid: String,

    /// When the link was recorded
    pub linked_at: DateTime<Utc>,
}

impl ProviderLink {
    /// Creates a link stamped with the current time.
    pub fn new(provider: ProviderName, uid: impl Into<String>) -> Self {
        Self {
            provider,
            uid: uid.into(),
            linked_at: Utc::now(),
        }
    }

    /// Check whether this link refers to the given external identity.
    pub fn matches(&self, provider: ProviderName, uid: &str) -> bool {
        self.provider == provider && self.uid == uid
    }
}

/// A tenant-scoped account.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use feedback_org::{ProviderLink, ProviderName, Role, User};
///
/// let user = User::new_visitor(
///     Uuid::now_v7(),
///     "jdoe",
///     "jdoe@uab.edu",
///     ProviderLink::new(ProviderName::Cas, "jdoe"),
/// );
/// assert_eq!(user.role, Role::Visitor);
/// assert!(user.has_link(ProviderName::Cas, "jdoe"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Display name
    pub name: String,

    /// Email address, possibly empty when the provider released none
    pub email: String,

    /// Role within the tenant
    pub role: Role,

    /// Linked external identities, in link order
    #[serde(default)]
    pub providers: Vec<ProviderLink>,

    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a least-privileged account with its first provider link.
    pub fn new_visitor(
        tenant_id: Uuid,
        name: impl Into<String>,
        email: impl Into<String>,
        link: ProviderLink,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            name: name.into(),
            email: email.into(),
            role: Role::Visitor,
            providers: vec![link],
            created_at: Utc::now(),
        }
    }

    /// Check whether this exact external identity is linked.
    pub fn has_link(&self, provider: ProviderName, uid: &str) -> bool {
        self.providers.iter().any(|link| link.matches(provider, uid))
    }
}
