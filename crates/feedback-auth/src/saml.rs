//! SAML 2.0 service provider.
//!
//! The IdP is described by configuration only (SSO URL, signing certificate,
//! entity id); its metadata is never fetched. [`SamlAdapter`] checks the
//! configuration and builds a [`SamlServiceProvider`] per request, which
//! issues AuthnRequests over the redirect binding, validates POSTed
//! responses and renders our metadata.
//!
//! Responses must carry a valid XML signature from the configured IdP
//! certificate; samael verifies it through libxmlsec1.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::X509;
use quick_xml::escape::escape;
use samael::metadata::EntityDescriptor;
use samael::service_provider::ServiceProvider;
use tracing::{debug, warn};
use url::Url;

use crate::config::{SamlConfig, SsoConfig};
use crate::error::{AuthError, AuthResult};
use crate::login_state::{LoginState, LoginStateCarrier};
use crate::profile::ExternalProfile;

/// Content type for SP metadata documents.
pub const METADATA_CONTENT_TYPE: &str = "application/samlmetadata+xml";

const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
const HTTP_REDIRECT_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
const HTTP_POST_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
const OID_DISPLAY_NAME: &str = "urn:oid:2.16.840.1.113730.3.1.241";
const FALLBACK_NAME: &str = "SAML User";

/// Entry point to the SAML service provider.
#[derive(Debug, Clone)]
pub struct SamlAdapter {
    config: SamlConfig,
}

impl SamlAdapter {
    /// Create an adapter over the SAML section of the configuration.
    pub fn new(config: &SsoConfig) -> Self {
        Self {
            config: config.saml.clone(),
        }
    }

    /// Check whether every setting SAML needs is present.
    pub fn is_configured(&self) -> bool {
        let c = &self.config;
        c.entity_id.is_some()
            && c.idp_sso_url.is_some()
            && c.idp_cert.is_some()
            && c.sp_cert_path.is_some()
            && c.sp_key_path.is_some()
    }

    /// Build a service provider serving `metadata_url` and `acs_url`.
    ///
    /// Loads our key pair from disk and describes the IdP from configuration.
    pub fn build_service_provider(
        &self,
        metadata_url: &str,
        acs_url: &str,
    ) -> AuthResult<SamlServiceProvider> {
        let c = &self.config;
        let (Some(entity_id), Some(sso_url), Some(idp_cert), Some(cert_path), Some(key_path)) = (
            c.entity_id.as_deref(),
            c.idp_sso_url.as_deref(),
            c.idp_cert.as_deref(),
            c.sp_cert_path.as_deref(),
            c.sp_key_path.as_deref(),
        ) else {
            return Err(AuthError::NotConfigured);
        };

        Url::parse(sso_url)
            .map_err(|e| AuthError::ConfigError(format!("invalid SAML_IDP_SSO_URL: {e}")))?;

        let certificate = load_certificate(cert_path)?;
        let private_key = load_private_key(key_path)?;
        let idp_entity_id = c.idp_entity_id.as_deref().unwrap_or(sso_url);
        let idp_metadata = build_idp_metadata(idp_entity_id, sso_url, idp_cert)?;

        let sp = ServiceProvider {
            entity_id: Some(entity_id.to_string()),
            metadata_url: Some(metadata_url.to_string()),
            acs_url: Some(acs_url.to_string()),
            idp_metadata,
            certificate: Some(certificate.clone()),
            ..ServiceProvider::default()
        };

        Ok(SamlServiceProvider {
            sp,
            entity_id: entity_id.to_string(),
            acs_url: acs_url.to_string(),
            sso_url: sso_url.to_string(),
            certificate,
            signing_key: c.sign_requests.then_some(private_key),
        })
    }
}

/// A service provider bound to our endpoints and the configured IdP.
pub struct SamlServiceProvider {
    sp: ServiceProvider,
    entity_id: String,
    acs_url: String,
    sso_url: String,
    certificate: X509,
    signing_key: Option<PKey<Private>>,
}

impl std::fmt::Debug for SamlServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamlServiceProvider")
            .field("entity_id", &self.entity_id)
            .field("acs_url", &self.acs_url)
            .field("sso_url", &self.sso_url)
            .field("signs_requests", &self.signing_key.is_some())
            .finish()
    }
}

impl SamlServiceProvider {
    /// Our entity ID.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Issue an AuthnRequest and return the IdP redirect URL.
    ///
    /// The request id and `redirect` are recorded through `carrier`, bound to
    /// `session`; the carrier value travels as RelayState.
    pub async fn build_login_url(
        &self,
        carrier: &dyn LoginStateCarrier,
        redirect: &str,
        session: &str,
    ) -> AuthResult<String> {
        let request = self
            .sp
            .make_authentication_request(&self.sso_url)
            .map_err(|e| AuthError::Internal(format!("Failed to create AuthnRequest: {e}")))?;
        let request_id = request.id.clone();

        let relay_state = carrier
            .issue(
                LoginState::redirect(redirect).with_request_id(request_id.clone()),
                session,
            )
            .await?;

        let url = request
            .redirect(&relay_state)
            .map_err(|e| AuthError::Internal(format!("Failed to encode AuthnRequest: {e}")))?
            .ok_or_else(|| AuthError::Internal("AuthnRequest has no destination".to_string()))?;

        let url = match &self.signing_key {
            Some(key) => sign_redirect_url(url, key)?,
            None => url,
        };

        debug!(request_id = %request_id, signed = self.signing_key.is_some(), "Issued SAML AuthnRequest");
        Ok(url.to_string())
    }

    /// Validate a base64 `SAMLResponse` and return its assertion.
    ///
    /// The response must answer one of `expected_request_ids`; anything else
    /// (including unsolicited responses) is a [`AuthError::ForgedRequest`].
    /// Signature, audience, recipient and timing failures are
    /// [`AuthError::ValidationFailed`].
    pub fn parse_and_validate_response(
        &self,
        saml_response: &str,
        expected_request_ids: &[&str],
    ) -> AuthResult<SamlAssertion> {
        let encoded: String = saml_response
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let decoded = STANDARD
            .decode(&encoded)
            .map_err(|e| AuthError::ValidationFailed(format!("SAMLResponse is not base64: {e}")))?;
        let xml = String::from_utf8(decoded)
            .map_err(|_| AuthError::ValidationFailed("SAMLResponse is not UTF-8".to_string()))?;

        let response: samael::schema::Response = xml
            .parse()
            .map_err(|e| AuthError::ValidationFailed(format!("Malformed SAML response: {e}")))?;

        match response.in_response_to.as_deref() {
            Some(id) if expected_request_ids.contains(&id) => {}
            other => {
                warn!(
                    security_event = true,
                    in_response_to = ?other,
                    "SAML response does not answer an outstanding request"
                );
                return Err(AuthError::ForgedRequest(
                    "response does not correlate to an issued request".to_string(),
                ));
            }
        }

        if let Some(status) = &response.status {
            let code = status.status_code.value.as_deref();
            if code != Some(STATUS_SUCCESS) {
                return Err(AuthError::ValidationFailed(format!(
                    "IdP returned status {}",
                    code.unwrap_or("<none>")
                )));
            }
        }

        let assertion = self
            .sp
            .parse_base64_response(&encoded, Some(expected_request_ids))
            .map_err(|e| AuthError::ValidationFailed(format!("SAML response rejected: {e}")))?;

        let assertion = SamlAssertion::from(&assertion);
        if assertion.name_id.is_none() {
            return Err(AuthError::ValidationFailed(
                "SAML assertion has no NameID".to_string(),
            ));
        }
        Ok(assertion)
    }

    /// Render our SP metadata for IdP-side configuration.
    pub fn build_metadata_xml(&self) -> AuthResult<Vec<u8>> {
        let der = self
            .certificate
            .to_der()
            .map_err(|e| AuthError::Internal(format!("Failed to encode SP certificate: {e}")))?;

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}">
    <md:SPSSODescriptor AuthnRequestsSigned="{signed}" WantAssertionsSigned="true" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <ds:X509Data>
                    <ds:X509Certificate>{cert}</ds:X509Certificate>
                </ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>
        <md:NameIDFormat>urn:oasis:names:tc:SAML:2.0:nameid-format:persistent</md:NameIDFormat>
        <md:AssertionConsumerService Binding="{binding}" Location="{acs}" index="0" isDefault="true"/>
    </md:SPSSODescriptor>
</md:EntityDescriptor>
"#,
            entity_id = escape(&self.entity_id),
            signed = self.signing_key.is_some(),
            cert = STANDARD.encode(der),
            binding = HTTP_POST_BINDING,
            acs = escape(&self.acs_url),
        );
        Ok(xml.into_bytes())
    }
}

/// The parts of a validated assertion needed to build a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamlAssertion {
    /// Subject NameID
    pub name_id: Option<String>,
    /// Attributes across all attribute statements, in document order
    pub attributes: Vec<SamlAttribute>,
}

/// One `<saml:Attribute>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamlAttribute {
    pub name: Option<String>,
    pub friendly_name: Option<String>,
    pub values: Vec<String>,
}

impl SamlAttribute {
    /// Create an attribute with a name and values.
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: Some(name.into()),
            friendly_name: None,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn is_named(&self, names: &[&str]) -> bool {
        names.iter().any(|n| {
            self.name.as_deref() == Some(*n) || self.friendly_name.as_deref() == Some(*n)
        })
    }
}

impl SamlAssertion {
    fn first_value(&self, names: &[&str]) -> Option<&str> {
        self.attributes
            .iter()
            .filter(|a| a.is_named(names))
            .find_map(|a| a.values.first())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl From<&samael::schema::Assertion> for SamlAssertion {
    fn from(assertion: &samael::schema::Assertion) -> Self {
        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.trim().to_string())
            .filter(|v| !v.is_empty());

        let attributes = assertion
            .attribute_statements
            .iter()
            .flatten()
            .flat_map(|statement| statement.attributes.iter())
            .map(|attr| SamlAttribute {
                name: attr.name.clone(),
                friendly_name: attr.friendly_name.clone(),
                values: attr.values.iter().filter_map(|v| v.value.clone()).collect(),
            })
            .collect();

        Self {
            name_id,
            attributes,
        }
    }
}

/// Build a profile from an assertion.
///
/// Name resolution never fails: display name, then given name plus surname,
/// then the email's local part, then a fixed placeholder.
pub fn extract_profile(assertion: &SamlAssertion) -> ExternalProfile {
    let id = assertion.name_id.clone().unwrap_or_default();
    let email = assertion
        .first_value(&["email", "mail"])
        .unwrap_or_default()
        .to_string();

    let name = assertion
        .first_value(&["displayName", "cn", OID_DISPLAY_NAME])
        .map(str::to_string)
        .or_else(|| {
            let given = assertion.first_value(&["givenName"]).unwrap_or_default();
            let surname = assertion.first_value(&["sn"]).unwrap_or_default();
            Some(format!("{given} {surname}").trim().to_string()).filter(|n| !n.is_empty())
        })
        .or_else(|| {
            email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    ExternalProfile { id, email, name }
}

/// Reduce a PEM or bare base64 certificate to its base64 DER body.
pub fn normalize_certificate(cert: &str) -> AuthResult<String> {
    let body: String = cert
        .lines()
        .filter(|line| !line.trim_start().starts_with("-----"))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let der = STANDARD
        .decode(&body)
        .map_err(|e| AuthError::ConfigError(format!("IdP certificate is not base64: {e}")))?;
    X509::from_der(&der)
        .map_err(|e| AuthError::ConfigError(format!("IdP certificate is not X.509: {e}")))?;
    Ok(body)
}

fn build_idp_metadata(entity_id: &str, sso_url: &str, cert: &str) -> AuthResult<EntityDescriptor> {
    let xml = format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{}">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <ds:X509Data>
                    <ds:X509Certificate>{}</ds:X509Certificate>
                </ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>
        <md:SingleSignOnService Binding="{}" Location="{}"/>
    </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
        escape(entity_id),
        normalize_certificate(cert)?,
        HTTP_REDIRECT_BINDING,
        escape(sso_url),
    );

    samael::metadata::de::from_str(&xml)
        .map_err(|e| AuthError::ConfigError(format!("Failed to build IdP metadata: {e}")))
}

fn load_certificate(path: &str) -> AuthResult<X509> {
    let pem = std::fs::read(path)
        .map_err(|e| AuthError::ConfigError(format!("cannot read SP certificate {path}: {e}")))?;
    X509::from_pem(&pem)
        .map_err(|e| AuthError::ConfigError(format!("invalid SP certificate {path}: {e}")))
}

fn load_private_key(path: &str) -> AuthResult<PKey<Private>> {
    let pem = std::fs::read(path)
        .map_err(|e| AuthError::ConfigError(format!("cannot read SP key {path}: {e}")))?;
    PKey::private_key_from_pem(&pem)
        .map_err(|e| AuthError::ConfigError(format!("invalid SP key {path}: {e}")))
}

/// Sign a redirect-binding URL (SAMLRequest, RelayState, SigAlg in that order).
fn sign_redirect_url(mut url: Url, key: &PKey<Private>) -> AuthResult<Url> {
    let sig_alg = if key.ec_key().is_ok() {
        ECDSA_SHA256
    } else {
        RSA_SHA256
    };
    url.query_pairs_mut().append_pair("SigAlg", sig_alg);

    let signed_content = url
        .query()
        .ok_or_else(|| AuthError::Internal("No query string to sign".to_string()))?
        .to_string();

    let mut signer = Signer::new(MessageDigest::sha256(), key)
        .map_err(|e| AuthError::Internal(format!("Failed to create signer: {e}")))?;
    signer
        .update(signed_content.as_bytes())
        .map_err(|e| AuthError::Internal(format!("Failed to sign AuthnRequest: {e}")))?;
    let signature = signer
        .sign_to_vec()
        .map_err(|e| AuthError::Internal(format!("Failed to sign AuthnRequest: {e}")))?;

    url.query_pairs_mut()
        .append_pair("Signature", &STANDARD.encode(signature));
    Ok(url)
}
