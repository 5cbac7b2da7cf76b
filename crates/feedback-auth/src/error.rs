//! Error types for federated sign-in
//!
//! Every failure of the CAS and SAML flows is expressed as an [`AuthError`].
//! Controllers branch on the variant to pick a response (404, 403, a
//! redirect); the carried message is for logs only and never reaches the
//! browser.

use feedback_org::StoreError;
use thiserror::Error;

/// Sign-in error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The protocol is not enabled for this deployment
    #[error("Sign-in method is not configured")]
    NotConfigured,

    /// Our own configuration is malformed (bad URL, unreadable key, bad certificate)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ticket, assertion, signature or timing validation failed
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Session binding or request correlation mismatch
    #[error("Forged request: {0}")]
    ForgedRequest(String),

    /// Unknown identity on a private tenant
    #[error("Identity is not invited to this tenant")]
    NotInvited,

    /// Another request provisioned or linked the same identity concurrently
    #[error("Concurrent account provisioning collision")]
    AccountLinkRace,

    /// A state or session token could not be decoded
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for sign-in operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// Validation failures and forged requests are caused by the outside
    /// world; configuration and internal errors are ours.
    pub fn is_server_error(&self) -> bool {
        matches!(self, AuthError::Internal(_) | AuthError::ConfigError(_))
    }

    /// Check if this error indicates a detected attack.
    pub fn is_security_event(&self) -> bool {
        matches!(self, AuthError::ForgedRequest(_))
    }

    /// Get HTTP status code for this error.
    ///
    /// Controllers turn most of these into redirects; the code is what the
    /// error means when no redirect is issued.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::NotConfigured => 404,
            AuthError::ForgedRequest(_) => 403,
            AuthError::NotInvited => 403,
            AuthError::ValidationFailed(_) | AuthError::InvalidToken(_) => 401,
            AuthError::AccountLinkRace => 409,
            AuthError::ConfigError(_) | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for logs and API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::NotConfigured => "NOT_CONFIGURED",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
            AuthError::ValidationFailed(_) => "VALIDATION_FAILED",
            AuthError::ForgedRequest(_) => "FORGED_REQUEST",
            AuthError::NotInvited => "NOT_INVITED",
            AuthError::AccountLinkRace => "ACCOUNT_LINK_RACE",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AuthError::AccountLinkRace,
            other => AuthError::Internal(other.to_string()),
        }
    }
}
