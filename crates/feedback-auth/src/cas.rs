//! CAS 2.0 client.
//!
//! Builds `/login` redirects and validates service tickets against
//! `/serviceValidate`. CAS compares the `service` parameter byte for byte
//! between login and validation, so both are derived from
//! [`CasClient::service_url`].

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{CasConfig, SsoConfig};
use crate::error::{AuthError, AuthResult};
use crate::profile::ExternalProfile;

/// CAS service ticket validator.
#[derive(Debug, Clone)]
pub struct CasClient {
    client: Client,
    config: CasConfig,
}

impl CasClient {
    /// Create a CAS client.
    ///
    /// Succeeds even when CAS is not configured; every operation then fails
    /// with [`AuthError::NotConfigured`].
    pub fn new(config: &SsoConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AuthError::ConfigError(format!("HTTP client: {e}")))?;

        if config.cas.server_url.is_some() && config.cas.email_domain.is_none() {
            warn!("CAS_EMAIL_DOMAIN is not set; CAS users will be created without an email");
        }

        Ok(Self {
            client,
            config: config.cas.clone(),
        })
    }

    /// Check whether a CAS server is configured.
    pub fn is_configured(&self) -> bool {
        self.config.server_url.is_some()
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        let server = self.config.server_url.as_deref().ok_or(AuthError::NotConfigured)?;
        let url = format!("{}/{}", server.trim_end_matches('/'), path);
        Url::parse(&url).map_err(|e| AuthError::ConfigError(format!("invalid CAS server URL: {e}")))
    }

    /// The callback URL CAS redirects to, carrying the post-login redirect.
    ///
    /// `site_base` is the base URL of the site serving the request; a
    /// configured service URL takes precedence over it.
    pub fn service_url(&self, site_base: &str, redirect: &str) -> String {
        let base = self
            .config
            .service_url
            .as_deref()
            .unwrap_or(site_base)
            .trim_end_matches('/');
        let encoded: String = url::form_urlencoded::byte_serialize(redirect.as_bytes()).collect();
        format!("{base}/cas/callback?redirect={encoded}")
    }

    /// Build the CAS `/login` URL for a redirect target.
    pub fn build_login_url(&self, site_base: &str, redirect: &str) -> AuthResult<String> {
        let mut url = self.endpoint("login")?;
        url.query_pairs_mut()
            .append_pair("service", &self.service_url(site_base, redirect));
        Ok(url.into())
    }

    /// Validate a service ticket and return the authenticated profile.
    ///
    /// `site_base` and `redirect` must be the values the login URL was built
    /// with.
    #[instrument(skip(self, ticket))]
    pub async fn validate_ticket(
        &self,
        ticket: &str,
        site_base: &str,
        redirect: &str,
    ) -> AuthResult<ExternalProfile> {
        let mut url = self.endpoint("serviceValidate")?;
        let ticket = ticket.trim();
        if ticket.is_empty() {
            return Err(AuthError::ValidationFailed("missing service ticket".to_string()));
        }
        url.query_pairs_mut()
            .append_pair("ticket", ticket)
            .append_pair("service", &self.service_url(site_base, redirect));

        debug!("Validating CAS service ticket");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::ValidationFailed("CAS validation timed out".to_string())
            } else {
                AuthError::ValidationFailed(format!("CAS validation request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthError::ValidationFailed(format!(
                "CAS server returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::ValidationFailed(format!("CAS response body: {e}")))?;

        match parse_service_response(&body).map_err(AuthError::ValidationFailed)? {
            ServiceResponse::Success { user } => {
                let username = user.trim().to_lowercase();
                if username.is_empty() {
                    return Err(AuthError::ValidationFailed(
                        "CAS response has an empty user".to_string(),
                    ));
                }
                debug!(user = %username, "CAS ticket validated");
                Ok(self.profile_for(&username))
            }
            ServiceResponse::Failure { code, message } => {
                warn!(code = %code, message = %message, "CAS server rejected ticket");
                Err(AuthError::ValidationFailed(format!(
                    "CAS authentication failure: {code}"
                )))
            }
        }
    }

    fn profile_for(&self, username: &str) -> ExternalProfile {
        let email = self
            .config
            .email_domain
            .as_deref()
            .map(|domain| format!("{}@{}", username, domain.trim_start_matches('@')))
            .unwrap_or_default();
        ExternalProfile::new(username, email, username)
    }
}

/// Outcome of a `/serviceValidate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceResponse {
    /// `<cas:authenticationSuccess>` with the text of `<cas:user>`
    Success { user: String },
    /// `<cas:authenticationFailure code="...">message</...>`
    Failure { code: String, message: String },
}

/// Parse a CAS 2.0 `serviceResponse` document.
///
/// The document must be well formed, rooted at `serviceResponse` and closed.
pub fn parse_service_response(xml: &str) -> Result<ServiceResponse, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut closed = false;
    let mut success = false;
    let mut user = String::new();
    let mut failure: Option<(String, String)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("malformed CAS response: {e}"))?;

        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Start(e) | Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if closed {
                    return Err(format!("unexpected element after serviceResponse: {name}"));
                }
                if stack.is_empty() && name != "serviceResponse" {
                    return Err(format!("unexpected root element: {name}"));
                }
                if stack.len() == 1 {
                    match name.as_str() {
                        "authenticationSuccess" => success = true,
                        "authenticationFailure" => {
                            let code = e
                                .attributes()
                                .flatten()
                                .find(|a| a.key.local_name().as_ref() == b"code")
                                .and_then(|a| a.unescape_value().ok())
                                .map(|v| v.into_owned())
                                .unwrap_or_default();
                            failure = Some((code, String::new()));
                        }
                        _ => {}
                    }
                }
                if is_start {
                    stack.push(name);
                } else if stack.is_empty() {
                    closed = true;
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if stack.pop().as_deref() != Some(name.as_str()) {
                    return Err(format!("mismatched closing tag: {name}"));
                }
                if stack.is_empty() {
                    closed = true;
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| format!("malformed CAS response text: {e}"))?;
                append_text(&stack, &text, &mut user, &mut failure);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                append_text(&stack, &text, &mut user, &mut failure);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !closed {
        return Err("incomplete CAS response".to_string());
    }

    match (success, failure) {
        (true, _) => Ok(ServiceResponse::Success { user }),
        (false, Some((code, message))) => Ok(ServiceResponse::Failure {
            code,
            message: message.trim().to_string(),
        }),
        (false, None) => Err("CAS response has no authentication result".to_string()),
    }
}

fn append_text(
    stack: &[String],
    text: &str,
    user: &mut String,
    failure: &mut Option<(String, String)>,
) {
    match stack {
        [_, outcome, field] if outcome == "authenticationSuccess" && field == "user" => {
            user.push_str(text)
        }
        [_, outcome] if outcome == "authenticationFailure" => {
            if let Some((_, message)) = failure.as_mut() {
                message.push_str(text);
            }
        }
        _ => {}
    }
}
