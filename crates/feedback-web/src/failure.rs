//! Mapping sign-in failures onto responses.
//!
//! | Failure                | Response                          |
//! |------------------------|-----------------------------------|
//! | `NotConfigured`        | 404                               |
//! | `ForgedRequest`        | 403                               |
//! | `NotInvited`           | redirect to `/not-invited`        |
//! | anything else          | redirect to `/signin?error=...`   |
//!
//! Users only ever see the generic message attached at the call site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{error, warn};
use url::form_urlencoded;

use feedback_auth::AuthError;

/// Page shown to users of private tenants who were never invited.
pub const NOT_INVITED_PATH: &str = "/not-invited";

/// Sign-in page that displays the failure message.
pub const SIGNIN_PATH: &str = "/signin";

pub const CAS_FAILED: &str = "CAS sign-in failed. Please try again.";
pub const SAML_FAILED: &str = "SAML sign-in failed. Please try again.";

/// A failed sign-in flow together with the message shown to the user.
#[derive(Debug)]
pub struct FlowError {
    pub error: AuthError,
    pub message: &'static str,
}

impl FlowError {
    pub fn new(error: AuthError, message: &'static str) -> Self {
        Self { error, message }
    }

    /// Where the user is sent, for failures that redirect.
    pub fn redirect_target(&self) -> Option<String> {
        match self.error {
            AuthError::NotConfigured | AuthError::ForgedRequest(_) => None,
            AuthError::NotInvited => Some(NOT_INVITED_PATH.to_string()),
            _ => {
                let query: String = form_urlencoded::Serializer::new(String::new())
                    .append_pair("error", self.message)
                    .finish();
                Some(format!("{SIGNIN_PATH}?{query}"))
            }
        }
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        match &self.error {
            AuthError::NotConfigured => return StatusCode::NOT_FOUND.into_response(),
            AuthError::ForgedRequest(reason) => {
                warn!(security_event = true, reason = %reason, "Rejected forged sign-in request");
                return StatusCode::FORBIDDEN.into_response();
            }
            AuthError::NotInvited => {}
            e if e.is_server_error() => {
                error!(error = %e, code = e.error_code(), "Sign-in failed");
            }
            e => {
                warn!(error = %e, code = e.error_code(), "Sign-in failed");
            }
        }

        match self.redirect_target() {
            Some(target) => Redirect::to(&target).into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Attach a user-facing message to an [`AuthError`].
pub trait FlowResultExt<T> {
    fn or_fail_with(self, message: &'static str) -> Result<T, FlowError>;
}

impl<T> FlowResultExt<T> for Result<T, AuthError> {
    fn or_fail_with(self, message: &'static str) -> Result<T, FlowError> {
        self.map_err(|e| FlowError::new(e, message))
    }
}
