//! Token claims
//!
//! Two token shapes are signed with the same HMAC key:
//! - [`SignedStateClaims`]: short-lived per-login-attempt state carried by the
//!   browser through the IdP round trip (SAML RelayState).
//! - [`SessionClaims`]: the authenticated session established after a
//!   successful sign-in.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use feedback_org::{ProviderName, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-login-attempt state.
///
/// Immutable once issued. Expiry is kept at whole-second precision so that a
/// decoded token compares equal to the claims it was minted from.
///
/// # Example
///
/// ```rust
/// use feedback_auth::claims::SignedStateClaims;
///
/// let claims = SignedStateClaims::new(
///     "https://feedback.example.com/posts/1",
///     "session-1",
///     "id-abc",
///     chrono::Duration::minutes(10),
/// );
/// assert!(!claims.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedStateClaims {
    /// Where to send the browser after sign-in
    pub redirect: String,

    /// Opaque id of the browser session that started the login
    pub session_binding: String,

    /// Protocol request id (AuthnRequest ID), empty when not applicable
    #[serde(default)]
    pub request_id: String,

    /// Expiry, serialized as the standard `exp` claim
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl SignedStateClaims {
    /// Create state claims expiring `ttl` from now.
    pub fn new(
        redirect: impl Into<String>,
        session_binding: impl Into<String>,
        request_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            redirect: redirect.into(),
            session_binding: session_binding.into(),
            request_id: request_id.into(),
            expires_at: (Utc::now() + ttl).trunc_subsecs(0),
        }
    }

    /// Check if the state has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Authenticated session claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// JWT ID
    pub jti: String,

    /// Tenant the session is valid for
    pub tenant_id: Uuid,

    /// User email at sign-in time
    #[serde(default)]
    pub email: String,

    /// User display name at sign-in time
    #[serde(default)]
    pub name: String,

    /// Provider the user signed in with
    pub auth_method: ProviderName,
}

impl SessionClaims {
    /// Create session claims for a resolved user.
    pub fn new(
        user: &User,
        auth_method: ProviderName,
        issuer: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user.id.to_string(),
            iss: issuer.into(),
            exp: (now + duration).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::now_v7().to_string(),
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            name: user.name.clone(),
            auth_method,
        }
    }

    /// Get the user ID as a UUID.
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Check if the session belongs to the given tenant.
    pub fn is_for_tenant(&self, tenant_id: Uuid) -> bool {
        self.tenant_id == tenant_id
    }
}
