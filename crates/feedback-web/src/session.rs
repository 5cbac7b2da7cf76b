//! Browser session and sign-in cookies.
//!
//! Two cookies are involved:
//! - the browser session cookie, an opaque random id that login state is
//!   bound to;
//! - the auth cookie, holding the session token of a signed-in user.
//!
//! The session cookie must survive the IdP's cross-site POST to the ACS, so
//! on HTTPS deployments it is `SameSite=None; Secure`.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::convert::Infallible;

use feedback_auth::{JwtService, SessionClaims};
use feedback_org::Tenant;

/// Cookie holding the browser session id.
pub const SESSION_COOKIE_NAME: &str = "feedback_session";

/// Cookie holding the signed-in user's session token.
pub const AUTH_COOKIE_NAME: &str = "auth";

/// The browser session a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSession {
    /// Opaque session id
    pub id: String,
    /// The id was minted for this request and still has to be set as a cookie
    pub is_new: bool,
}

impl BrowserSession {
    /// Start a new session with a random id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self {
            id: URL_SAFE_NO_PAD.encode(bytes),
            is_new: true,
        }
    }

    /// Set the session cookie on `response` if the session is new.
    pub fn attach(&self, mut response: Response, secure: bool) -> Response {
        if self.is_new {
            append_cookie(response.headers_mut(), &session_cookie(&self.id, secure));
        }
        response
    }
}

fn is_valid_session_id(id: &str) -> bool {
    (16..=128).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BrowserSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(match read_cookie(&parts.headers, SESSION_COOKIE_NAME) {
            Some(id) if is_valid_session_id(&id) => Self { id, is_new: false },
            _ => Self::generate(),
        })
    }
}

/// Read a cookie value from request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .find_map(|part| part.strip_prefix(&prefix))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for the browser session cookie.
#[must_use]
pub fn session_cookie(id: &str, secure: bool) -> String {
    let same_site = if secure { "None; Secure" } else { "Lax" };
    format!("{SESSION_COOKIE_NAME}={id}; HttpOnly; Path=/; SameSite={same_site}")
}

/// `Set-Cookie` value for the auth cookie.
#[must_use]
pub fn auth_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{AUTH_COOKIE_NAME}={token}; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age={max_age_secs}"
    )
}

/// Append a `Set-Cookie` header.
pub fn append_cookie(headers: &mut HeaderMap, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        headers.append(SET_COOKIE, value);
    }
}

/// Session claims of an already signed-in user of `tenant`, if any.
pub fn signed_in_user(headers: &HeaderMap, jwt: &JwtService, tenant: &Tenant) -> Option<SessionClaims> {
    let token = read_cookie(headers, AUTH_COOKIE_NAME)?;
    jwt.validate_session(&token)
        .ok()
        .filter(|claims| claims.is_for_tenant(tenant.id))
}
