//! Tenant domain model
//!
//! A tenant is one feedback site. Every user, provider link and sign-in
//! decision is scoped to exactly one tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A feedback site served under its own host.
///
/// # Examples
///
/// ```
/// use feedback_org::Tenant;
///
/// let tenant = Tenant::new("Acme Feedback", "feedback.acme.com").private();
/// assert!(tenant.is_private);
/// assert!(tenant.serves_host("FEEDBACK.acme.com:443"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    /// Unique identifier for the tenant
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Host name the tenant is served under (no port)
    pub host: String,

    /// Private tenants only admit invited users
    pub is_private: bool,

    /// When the tenant was created
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Creates a new public tenant.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            host: host.into().to_ascii_lowercase(),
            is_private: false,
            created_at: Utc::now(),
        }
    }

    /// Marks the tenant as invite-only.
    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// Check whether a `Host` header value addresses this tenant.
    ///
    /// The comparison ignores ASCII case and any `:port` suffix.
    pub fn serves_host(&self, host: &str) -> bool {
        let name = host.rsplit_once(':').map_or(host, |(name, port)| {
            if port.chars().all(|c| c.is_ascii_digit()) {
                name
            } else {
                host
            }
        });
        name.eq_ignore_ascii_case(&self.host)
    }
}
