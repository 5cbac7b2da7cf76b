//! Per-login state carriers
//!
//! Both protocols must carry the post-login redirect (and, for SAML, the
//! AuthnRequest id) across the round trip to the identity provider, bound to
//! the browser session that started it. [`LoginStateCarrier`] is that
//! contract; each protocol picks a mechanism:
//!
//! - [`SignedStateCarrier`]: state lives in a signed token the browser hands
//!   back (SAML RelayState).
//! - [`CachedStateCarrier`]: state lives server-side under a key derived from
//!   the session id (CAS).

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::warn;

use crate::cache::StateCache;
use crate::claims::SignedStateClaims;
use crate::error::{AuthError, AuthResult};
use crate::jwt::JwtService;

/// State captured when a login starts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginState {
    /// Post-login redirect target, empty for "site root"
    pub redirect: String,

    /// Protocol request id to correlate the response with
    pub request_id: Option<String>,
}

impl LoginState {
    /// State carrying only a redirect target.
    pub fn redirect(redirect: impl Into<String>) -> Self {
        Self {
            redirect: redirect.into(),
            request_id: None,
        }
    }

    /// Attach the protocol request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Binds transient login state to a browser session, with expiry.
#[async_trait]
pub trait LoginStateCarrier: Send + Sync {
    /// Record state for `session` and return the carrier value to send along
    /// (may be empty when the state is kept server-side).
    async fn issue(&self, state: LoginState, session: &str) -> AuthResult<String>;

    /// Recover the state recorded for `session`.
    async fn resolve(&self, carrier: &str, session: &str) -> AuthResult<LoginState>;
}

/// State carried in a signed, expiring token.
///
/// Any decode failure and any session mismatch is reported as
/// [`AuthError::ForgedRequest`].
#[derive(Debug, Clone)]
pub struct SignedStateCarrier {
    jwt: Arc<JwtService>,
}

impl SignedStateCarrier {
    /// Create a carrier signing with the given JWT service.
    pub fn new(jwt: Arc<JwtService>) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl LoginStateCarrier for SignedStateCarrier {
    async fn issue(&self, state: LoginState, session: &str) -> AuthResult<String> {
        let claims = SignedStateClaims::new(
            state.redirect,
            session,
            state.request_id.unwrap_or_default(),
            self.jwt.state_ttl(),
        );
        self.jwt.encode_state(&claims)
    }

    async fn resolve(&self, carrier: &str, session: &str) -> AuthResult<LoginState> {
        if carrier.is_empty() {
            warn!(security_event = true, "Login state token missing");
            return Err(AuthError::ForgedRequest("missing state token".to_string()));
        }

        let claims = self.jwt.decode_state(carrier).map_err(|_| {
            warn!(security_event = true, "Login state token failed verification");
            AuthError::ForgedRequest("invalid state token".to_string())
        })?;

        if session.is_empty() || claims.session_binding != session {
            warn!(security_event = true, "Login state bound to a different session");
            return Err(AuthError::ForgedRequest(
                "state token bound to another session".to_string(),
            ));
        }

        Ok(LoginState {
            redirect: claims.redirect,
            request_id: Some(claims.request_id).filter(|id| !id.is_empty()),
        })
    }
}

/// State kept server-side under `prefix + session`.
///
/// Entries are consumed on resolve. A missing or expired entry yields an
/// empty redirect rather than an error; the cache key is derived from the
/// session, so there is nothing a client could have forged.
#[derive(Clone)]
pub struct CachedStateCarrier {
    cache: Arc<dyn StateCache>,
    prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for CachedStateCarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedStateCarrier")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CachedStateCarrier {
    /// Key prefix used by the CAS flow.
    pub const CAS_PREFIX: &'static str = "cas_redirect:";

    /// Create a carrier storing entries under `prefix`.
    pub fn new(cache: Arc<dyn StateCache>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            ttl,
        }
    }

    /// Carrier for the CAS redirect hand-off.
    pub fn for_cas(cache: Arc<dyn StateCache>, ttl: Duration) -> Self {
        Self::new(cache, Self::CAS_PREFIX, ttl)
    }

    fn key(&self, session: &str) -> String {
        format!("{}{}", self.prefix, session)
    }
}

#[async_trait]
impl LoginStateCarrier for CachedStateCarrier {
    async fn issue(&self, state: LoginState, session: &str) -> AuthResult<String> {
        if session.is_empty() {
            return Err(AuthError::Internal("no browser session to bind state to".to_string()));
        }
        let ttl = self
            .ttl
            .to_std()
            .map_err(|e| AuthError::ConfigError(format!("invalid state TTL: {e}")))?;
        self.cache.put(&self.key(session), &state.redirect, ttl).await?;
        Ok(String::new())
    }

    async fn resolve(&self, _carrier: &str, session: &str) -> AuthResult<LoginState> {
        if session.is_empty() {
            return Ok(LoginState::default());
        }
        let redirect = self.cache.take(&self.key(session)).await?.unwrap_or_default();
        Ok(LoginState::redirect(redirect))
    }
}
