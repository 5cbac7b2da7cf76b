//! JWT token generation and validation
//!
//! One HS256 key signs both the login state token (relay state) and the
//! session token. State tokens fail closed: every decode error collapses to
//! the same [`AuthError::InvalidToken`] so a caller cannot tell an expired
//! token from a tampered one.

use crate::claims::{SessionClaims, SignedStateClaims};
use crate::config::SsoConfig;
use crate::error::{AuthError, AuthResult};
use chrono::Duration;
use feedback_org::{ProviderName, User};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// JWT configuration for token generation and validation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC
    pub secret: String,

    /// Session token issuer
    pub issuer: String,

    /// Login state lifetime
    pub state_ttl: Duration,

    /// Session lifetime
    pub session_ttl: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "feedback-board".to_string(),
            state_ttl: Duration::minutes(10),
            session_ttl: Duration::days(30),
        }
    }
}

impl JwtConfig {
    /// Derive JWT settings from the sign-in configuration.
    pub fn from_sso(config: &SsoConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            state_ttl: Duration::seconds(config.state_ttl_secs as i64),
            session_ttl: Duration::seconds(config.session_ttl_secs as i64),
            ..Self::default()
        }
    }
}

/// JWT service for token operations.
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.config.issuer)
            .field("state_ttl", &self.config.state_ttl)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

impl JwtService {
    /// Create a new JWT service with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - JWT configuration
    ///
    /// # Returns
    ///
    /// JWT service or configuration error
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::ConfigError("Secret required for HMAC".to_string()));
        }
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    /// Create with a simple secret and default lifetimes.
    pub fn with_secret(secret: impl Into<String>) -> AuthResult<Self> {
        Self::new(JwtConfig {
            secret: secret.into(),
            ..Default::default()
        })
    }

    /// Lifetime of login state tokens.
    pub fn state_ttl(&self) -> Duration {
        self.config.state_ttl
    }

    /// Lifetime of session tokens.
    pub fn session_ttl(&self) -> Duration {
        self.config.session_ttl
    }

    /// Encode login state into a compact signed token.
    ///
    /// # Arguments
    ///
    /// * `claims` - State to carry through the IdP round trip
    ///
    /// # Returns
    ///
    /// Encoded token string, suitable as a SAML RelayState
    pub fn encode_state(&self, claims: &SignedStateClaims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("State token encoding failed: {}", e)))
    }

    /// Verify and decode a login state token.
    ///
    /// Rejects bad signatures, malformed tokens and tokens past `exp`, all
    /// with the same error.
    pub fn decode_state(&self, token: &str) -> AuthResult<SignedStateClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        decode::<SignedStateClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(reason = ?e.kind(), "State token rejected");
                AuthError::InvalidToken("state token rejected".to_string())
            })
    }

    /// Issue a session token for a signed-in user.
    pub fn issue_session(&self, user: &User, auth_method: ProviderName) -> AuthResult<String> {
        let claims = SessionClaims::new(
            user,
            auth_method,
            self.config.issuer.clone(),
            self.config.session_ttl,
        );
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Session token encoding failed: {}", e)))
    }

    /// Validate and decode a session token.
    pub fn validate_session(&self, token: &str) -> AuthResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.validate_aud = false;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AuthError::InvalidToken("Session expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("Invalid signature".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    AuthError::InvalidToken("Invalid issuer".to_string())
                }
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}
