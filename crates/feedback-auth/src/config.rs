//! Sign-in configuration.
//!
//! A single [`SsoConfig`] is built at startup (usually with
//! [`SsoConfig::from_env`]) and handed to each adapter's constructor. Nothing
//! in this crate reads the environment after that.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Top-level configuration for federated sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoConfig {
    /// Public base URL of the default site (e.g., "https://feedback.example.com").
    ///
    /// Its scheme applies to every tenant; per-request URLs take the host
    /// from the request.
    pub base_url: String,

    /// HMAC secret for state and session tokens.
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Timeout for outbound calls to the CAS server, in seconds.
    pub request_timeout_secs: u64,

    /// Lifetime of per-login state (relay-state token, CAS cache entry), in seconds.
    pub state_ttl_secs: u64,

    /// Lifetime of the authenticated session, in seconds.
    pub session_ttl_secs: u64,

    /// CAS client settings.
    pub cas: CasConfig,

    /// SAML service provider settings.
    pub saml: SamlConfig,

    /// Redis URL for the login-state cache. In-memory when absent.
    pub redis_url: Option<String>,
}

/// CAS 2.0 client settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CasConfig {
    /// CAS server root (e.g., "https://login.example.edu/cas").
    pub server_url: Option<String>,

    /// Base URL CAS redirects back to. Defaults to the site base URL.
    pub service_url: Option<String>,

    /// Domain appended to CAS usernames to form an email address.
    pub email_domain: Option<String>,
}

/// SAML 2.0 service provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlConfig {
    /// Our entity ID.
    pub entity_id: Option<String>,

    /// IdP single sign-on endpoint (redirect binding).
    pub idp_sso_url: Option<String>,

    /// IdP signing certificate, PEM or bare base64 DER.
    pub idp_cert: Option<String>,

    /// IdP entity ID. Defaults to the SSO URL.
    pub idp_entity_id: Option<String>,

    /// Path to our PEM certificate.
    pub sp_cert_path: Option<String>,

    /// Path to our PEM private key.
    pub sp_key_path: Option<String>,

    /// Sign AuthnRequests with our private key.
    pub sign_requests: bool,
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            entity_id: None,
            idp_sso_url: None,
            idp_cert: None,
            idp_entity_id: None,
            sp_cert_path: None,
            sp_key_path: None,
            sign_requests: true,
        }
    }
}

impl Default for SsoConfig {
    /// Returns configuration suitable for local development, with both
    /// protocols disabled.
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            jwt_secret: String::new(),
            request_timeout_secs: 10,
            state_ttl_secs: 600,
            session_ttl_secs: 60 * 60 * 24 * 30,
            cas: CasConfig::default(),
            saml: SamlConfig::default(),
            redis_url: None,
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_opt(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl SsoConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BASE_URL`: Public site URL (default: http://localhost:3000)
    /// - `JWT_SECRET`: Token signing secret
    /// - `SSO_REQUEST_TIMEOUT_SECS`: CAS validation timeout (default: 10)
    /// - `SSO_STATE_TTL_SECS`: Login state lifetime (default: 600)
    /// - `SESSION_TTL_SECS`: Session lifetime (default: 30 days)
    /// - `CAS_SERVER_URL`, `CAS_SERVICE_URL`, `CAS_EMAIL_DOMAIN`
    /// - `SAML_ENTITY_ID`, `SAML_IDP_SSO_URL`, `SAML_IDP_CERT`, `SAML_IDP_ENTITY_ID`
    /// - `SAML_SP_CERT_PATH`, `SAML_SP_KEY_PATH`
    /// - `SAML_SIGN_REQUESTS`: Sign AuthnRequests (default: true)
    /// - `REDIS_URL`: Login-state cache backend
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            base_url: env_opt("BASE_URL").unwrap_or(default.base_url),
            jwt_secret: env_opt("JWT_SECRET").unwrap_or_default(),
            request_timeout_secs: env_parse("SSO_REQUEST_TIMEOUT_SECS", default.request_timeout_secs),
            state_ttl_secs: env_parse("SSO_STATE_TTL_SECS", default.state_ttl_secs),
            session_ttl_secs: env_parse("SESSION_TTL_SECS", default.session_ttl_secs),
            cas: CasConfig {
                server_url: env_opt("CAS_SERVER_URL"),
                service_url: env_opt("CAS_SERVICE_URL"),
                email_domain: env_opt("CAS_EMAIL_DOMAIN"),
            },
            saml: SamlConfig {
                entity_id: env_opt("SAML_ENTITY_ID"),
                idp_sso_url: env_opt("SAML_IDP_SSO_URL"),
                idp_cert: env_opt("SAML_IDP_CERT"),
                idp_entity_id: env_opt("SAML_IDP_ENTITY_ID"),
                sp_cert_path: env_opt("SAML_SP_CERT_PATH"),
                sp_key_path: env_opt("SAML_SP_KEY_PATH"),
                sign_requests: env_opt("SAML_SIGN_REQUESTS")
                    .map(|s| s != "false" && s != "0")
                    .unwrap_or(default.saml.sign_requests),
            },
            redis_url: env_opt("REDIS_URL"),
        }
    }

    /// Site base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Timeout for outbound requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Lifetime of per-login state.
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Validate values that would otherwise fail at request time.
    pub fn validate(&self) -> AuthResult<()> {
        if self.jwt_secret.len() < 32 {
            return Err(AuthError::ConfigError(
                "JWT_SECRET must be at least 32 bytes".to_string(),
            ));
        }
        Url::parse(&self.base_url)
            .map_err(|e| AuthError::ConfigError(format!("invalid BASE_URL: {e}")))?;
        if self.state_ttl_secs == 0 || self.request_timeout_secs == 0 {
            return Err(AuthError::ConfigError(
                "state TTL and request timeout must be non-zero".to_string(),
            ));
        }
        if let Some(server) = &self.cas.server_url {
            Url::parse(server)
                .map_err(|e| AuthError::ConfigError(format!("invalid CAS_SERVER_URL: {e}")))?;
        }
        if let Some(service) = &self.cas.service_url {
            Url::parse(service)
                .map_err(|e| AuthError::ConfigError(format!("invalid CAS_SERVICE_URL: {e}")))?;
        }
        Ok(())
    }
}
