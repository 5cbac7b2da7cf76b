//! Normalized identity released by an external provider.

use serde::{Deserialize, Serialize};

/// Identity as reported by CAS or a SAML IdP.
///
/// `id` is the provider's stable subject identifier and the only field
/// guaranteed non-empty after a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalProfile {
    /// Stable external subject identifier
    pub id: String,

    /// Email address, empty when not released
    pub email: String,

    /// Display name
    pub name: String,
}

impl ExternalProfile {
    /// Create a profile.
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
        }
    }

    /// Check whether the profile carries a usable subject identifier.
    pub fn has_subject(&self) -> bool {
        !self.id.trim().is_empty()
    }
}
