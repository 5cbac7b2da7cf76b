//! End-to-end sign-in flows through the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, HOST, LOCATION, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, SecondsFormat, Utc};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use openssl::pkey::PKey;

use feedback_auth::{MemoryStateCache, SamlConfig, SsoConfig};
use feedback_org::{
    MemoryTenantStore, MemoryUserStore, ProviderLink, ProviderName, Role, Tenant, User, UserStore,
};
use feedback_web::{router, AppState};

const HOST_NAME: &str = "feedback.example.com";
const OTHER_HOST_NAME: &str = "other.example.com";
const BASE_URL: &str = "https://feedback.example.com";
const METADATA_URL: &str = "https://feedback.example.com/saml/metadata";
const ACS_URL: &str = "https://feedback.example.com/saml/acs";
const IDP_SSO_URL: &str = "https://idp.example.com/sso";
const IDP_ENTITY_ID: &str = "https://idp.example.com/metadata";

const CAS_SUCCESS: &str = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
  <cas:authenticationSuccess>
    <cas:user>JDoe</cas:user>
  </cas:authenticationSuccess>
</cas:serviceResponse>"#;

const CAS_FAILURE: &str = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
  <cas:authenticationFailure code="INVALID_TICKET">Ticket ST-BAD not recognized</cas:authenticationFailure>
</cas:serviceResponse>"#;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn base_config() -> SsoConfig {
    SsoConfig {
        base_url: BASE_URL.to_string(),
        jwt_secret: "test-secret-key-that-is-at-least-32-bytes-long".to_string(),
        request_timeout_secs: 2,
        ..SsoConfig::default()
    }
}

fn with_cas(mut config: SsoConfig, server: &MockServer) -> SsoConfig {
    config.cas.server_url = Some(format!("{}/cas", server.uri()));
    config.cas.email_domain = Some("uab.edu".to_string());
    config
}

fn with_saml(mut config: SsoConfig) -> SsoConfig {
    config.saml = SamlConfig {
        entity_id: Some(METADATA_URL.to_string()),
        idp_sso_url: Some(IDP_SSO_URL.to_string()),
        idp_cert: Some(std::fs::read_to_string(fixture("idp.crt")).unwrap()),
        idp_entity_id: Some(IDP_ENTITY_ID.to_string()),
        sp_cert_path: Some(fixture("sp.crt")),
        sp_key_path: Some(fixture("sp.key")),
        sign_requests: true,
    };
    config
}

struct TestApp {
    router: Router,
    state: AppState,
    users: MemoryUserStore,
    tenant: Tenant,
}

async fn app(config: SsoConfig, tenant: Tenant) -> TestApp {
    app_with_tenants(config, tenant, Vec::new()).await
}

async fn app_with_tenants(config: SsoConfig, tenant: Tenant, others: Vec<Tenant>) -> TestApp {
    let users = MemoryUserStore::new();
    let tenants = MemoryTenantStore::new();
    tenants.insert(tenant.clone()).await;
    for other in others {
        tenants.insert(other).await;
    }

    let state = AppState::new(
        config,
        Arc::new(users.clone()),
        Arc::new(tenants),
        Arc::new(MemoryStateCache::new()),
    )
    .unwrap();

    TestApp {
        router: router(state.clone()),
        state,
        users,
        tenant,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        self.get_on(HOST_NAME, uri, cookie).await
    }

    async fn get_on(&self, host: &str, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::get(uri).header(HOST, host);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_acs(&self, saml_response: &str, relay_state: &str, cookie: &str) -> Response {
        self.post_acs_on(HOST_NAME, saml_response, relay_state, cookie)
            .await
    }

    async fn post_acs_on(
        &self,
        host: &str,
        saml_response: &str,
        relay_state: &str,
        cookie: &str,
    ) -> Response {
        let body: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("SAMLResponse", saml_response)
            .append_pair("RelayState", relay_state)
            .finish();
        let request = Request::post("/saml/acs")
            .header(HOST, host)
            .header(COOKIE, cookie)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// `name=value` of a cookie set by `response`.
fn set_cookie(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn query_value(url: &str, key: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// A SAML response to `in_response_to`, signed with the IdP fixture key.
fn saml_response(in_response_to: &str) -> String {
    saml_response_to(ACS_URL, in_response_to)
}

fn saml_response_to(acs_url: &str, in_response_to: &str) -> String {
    let now = Utc::now();
    let ts = |t: chrono::DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
    let xml = format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp1" Version="2.0" IssueInstant="{now}" Destination="{acs}" InResponseTo="{rid}">
  <saml:Issuer>{idp}</saml:Issuer>
  {signature}
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="_assert1" Version="2.0" IssueInstant="{now}">
    <saml:Issuer>{idp}</saml:Issuer>
    <saml:Subject>
      <saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:persistent">abc123</saml:NameID>
      <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
        <saml:SubjectConfirmationData NotOnOrAfter="{until}" Recipient="{acs}" InResponseTo="{rid}"/>
      </saml:SubjectConfirmation>
    </saml:Subject>
    <saml:Conditions NotBefore="{before}" NotOnOrAfter="{until}">
      <saml:AudienceRestriction><saml:Audience>{sp}</saml:Audience></saml:AudienceRestriction>
    </saml:Conditions>
    <saml:AuthnStatement AuthnInstant="{now}" SessionIndex="_session1">
      <saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef></saml:AuthnContext>
    </saml:AuthnStatement>
    <saml:AttributeStatement>
      <saml:Attribute Name="email"><saml:AttributeValue>a@x.com</saml:AttributeValue></saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#,
        now = ts(now),
        before = ts(now - Duration::minutes(1)),
        until = ts(now + Duration::minutes(5)),
        acs = acs_url,
        rid = in_response_to,
        idp = IDP_ENTITY_ID,
        sp = METADATA_URL,
        signature = signature_template("_resp1"),
    );

    let key = PKey::private_key_from_pem(&std::fs::read(fixture("idp.key")).unwrap())
        .unwrap()
        .rsa()
        .unwrap()
        .private_key_to_der()
        .unwrap();
    STANDARD.encode(samael::crypto::sign_xml(xml.as_str(), &key).unwrap())
}

/// Enveloped-signature template for the element with `reference_id`.
fn signature_template(reference_id: &str) -> String {
    let pem = std::fs::read_to_string(fixture("idp.crt")).unwrap();
    let cert: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect();
    format!(
        r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/><ds:Reference URI="#{reference_id}"><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue></ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue></ds:SignatureValue><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></ds:Signature>"##
    )
}

/// Start a SAML login; returns the session cookie and the relay state.
async fn start_saml_login(app: &TestApp, redirect: &str) -> (String, String) {
    start_saml_login_on(app, HOST_NAME, redirect).await
}

async fn start_saml_login_on(app: &TestApp, host: &str, redirect: &str) -> (String, String) {
    let response = app
        .get_on(host, &format!("/saml/login?redirect={redirect}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let target = location(&response);
    assert!(target.starts_with(IDP_SSO_URL), "{target}");
    let cookie = set_cookie(&response, "feedback_session").expect("session cookie");
    let relay_state = query_value(&target, "RelayState").expect("relay state");
    (cookie, relay_state)
}

async fn mount_cas(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/cas/serviceValidate"))
        .and(query_param("ticket", "ST-123"))
        .and(query_param(
            "service",
            "https://feedback.example.com/cas/callback?redirect=https%3A%2F%2Ffeedback.example.com%2Fposts%2F1",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(CAS_SUCCESS))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cas/serviceValidate"))
        .and(query_param("ticket", "ST-BAD"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CAS_FAILURE))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_cas_login_provisions_visitor_and_redirects() {
    let server = MockServer::start().await;
    mount_cas(&server).await;
    let app = app(with_cas(base_config(), &server), Tenant::new("Acme", HOST_NAME)).await;

    let response = app.get("/cas/login?redirect=/posts/1", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with(&format!("{}/cas/login?", server.uri())));
    assert_eq!(
        query_value(&target, "service").as_deref(),
        Some("https://feedback.example.com/cas/callback?redirect=https%3A%2F%2Ffeedback.example.com%2Fposts%2F1")
    );
    let cookie = set_cookie(&response, "feedback_session").expect("session cookie");

    let callback = app
        .get(
            "/cas/callback?ticket=ST-123&redirect=https%3A%2F%2Ffeedback.example.com%2Fposts%2F1",
            Some(&cookie),
        )
        .await;
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&callback), "https://feedback.example.com/posts/1");

    let auth = set_cookie(&callback, "auth").expect("auth cookie");
    let token = auth.trim_start_matches("auth=");
    let claims = app.state.jwt().validate_session(token).unwrap();
    assert_eq!(claims.auth_method, ProviderName::Cas);
    assert!(claims.is_for_tenant(app.tenant.id));

    let users = app.users.list(app.tenant.id).await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "jdoe@uab.edu");
    assert_eq!(users[0].role, Role::Visitor);
    assert!(users[0].has_link(ProviderName::Cas, "jdoe"));
}

#[tokio::test]
async fn test_cas_rejected_ticket_redirects_to_signin() {
    let server = MockServer::start().await;
    mount_cas(&server).await;
    let app = app(with_cas(base_config(), &server), Tenant::new("Acme", HOST_NAME)).await;

    let response = app.get("/cas/callback?ticket=ST-BAD&redirect=%2F", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/signin?error="));
    assert!(set_cookie(&response, "auth").is_none());
    assert!(app.users.is_empty().await);

    let missing = app.get("/cas/callback", None).await;
    assert!(location(&missing).starts_with("/signin?error="));
}

#[tokio::test]
async fn test_private_tenant_sends_strangers_to_not_invited() {
    let server = MockServer::start().await;
    mount_cas(&server).await;
    let app = app(
        with_cas(base_config(), &server),
        Tenant::new("Acme", HOST_NAME).private(),
    )
    .await;

    let login = app.get("/cas/login?redirect=/posts/1", None).await;
    let cookie = set_cookie(&login, "feedback_session").unwrap();

    let response = app
        .get(
            "/cas/callback?ticket=ST-123&redirect=https%3A%2F%2Ffeedback.example.com%2Fposts%2F1",
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/not-invited");
    assert!(app.users.is_empty().await);
}

#[tokio::test]
async fn test_open_redirect_is_forbidden() {
    let server = MockServer::start().await;
    let app = app(
        with_saml(with_cas(base_config(), &server)),
        Tenant::new("Acme", HOST_NAME),
    )
    .await;

    for uri in [
        "/cas/login?redirect=https%3A%2F%2Fevil.example.com%2F",
        "/saml/login?redirect=%2F%2Fevil.example.com",
    ] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn test_signed_in_user_skips_provider() {
    let server = MockServer::start().await;
    let app = app(with_cas(base_config(), &server), Tenant::new("Acme", HOST_NAME)).await;

    let user = User::new_visitor(
        app.tenant.id,
        "Jane",
        "jane@uab.edu",
        ProviderLink::new(ProviderName::Cas, "jane"),
    );
    let token = app.state.jwt().issue_session(&user, ProviderName::Cas).unwrap();

    let response = app
        .get("/cas/login?redirect=/posts/2", Some(&format!("auth={token}")))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://feedback.example.com/posts/2");
}

#[tokio::test]
async fn test_saml_login_signs_in_existing_linked_user() {
    let app = app(with_saml(base_config()), Tenant::new("Acme", HOST_NAME)).await;
    let existing = app
        .users
        .register(User::new_visitor(
            app.tenant.id,
            "A",
            "a@x.com",
            ProviderLink::new(ProviderName::Saml, "abc123"),
        ))
        .await
        .unwrap();

    let (cookie, relay_state) = start_saml_login(&app, "/posts/7").await;
    let request_id = app.state.jwt().decode_state(&relay_state).unwrap().request_id;

    let response = app
        .post_acs(&saml_response(&request_id), &relay_state, &cookie)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://feedback.example.com/posts/7");

    let auth = set_cookie(&response, "auth").expect("auth cookie");
    let claims = app
        .state
        .jwt()
        .validate_session(auth.trim_start_matches("auth="))
        .unwrap();
    assert_eq!(claims.user_id(), Some(existing.id));

    let users = app.users.list(app.tenant.id).await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].providers.len(), 1);
}

#[tokio::test]
async fn test_each_tenant_host_gets_its_own_callback_urls() {
    let server = MockServer::start().await;
    let other = Tenant::new("Other", OTHER_HOST_NAME);
    let app = app_with_tenants(
        with_saml(with_cas(base_config(), &server)),
        Tenant::new("Acme", HOST_NAME),
        vec![other.clone()],
    )
    .await;

    let cas_login = app
        .get_on(OTHER_HOST_NAME, "/cas/login?redirect=/posts/3", None)
        .await;
    assert_eq!(cas_login.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        query_value(&location(&cas_login), "service").as_deref(),
        Some("https://other.example.com/cas/callback?redirect=https%3A%2F%2Fother.example.com%2Fposts%2F3")
    );

    let (cookie, relay_state) = start_saml_login_on(&app, OTHER_HOST_NAME, "/posts/3").await;
    let state = app.state.jwt().decode_state(&relay_state).unwrap();
    assert_eq!(state.redirect, "https://other.example.com/posts/3");

    // A response addressed to the first tenant's ACS is not accepted here.
    let misaddressed = app
        .post_acs_on(
            OTHER_HOST_NAME,
            &saml_response(&state.request_id),
            &relay_state,
            &cookie,
        )
        .await;
    assert!(location(&misaddressed).starts_with("/signin?error="));

    let (cookie, relay_state) = start_saml_login_on(&app, OTHER_HOST_NAME, "/posts/3").await;
    let request_id = app.state.jwt().decode_state(&relay_state).unwrap().request_id;
    let response = app
        .post_acs_on(
            OTHER_HOST_NAME,
            &saml_response_to("https://other.example.com/saml/acs", &request_id),
            &relay_state,
            &cookie,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://other.example.com/posts/3");

    assert_eq!(app.users.list(other.id).await.len(), 1);
    assert!(app.users.list(app.tenant.id).await.is_empty());
}

#[tokio::test]
async fn test_unreadable_acs_form_redirects_to_signin() {
    let app = app(with_saml(base_config()), Tenant::new("Acme", HOST_NAME)).await;

    let request = Request::post("/saml/acs")
        .header(HOST, HOST_NAME)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"SAMLResponse":"x"}"#))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/signin?error="));
    assert!(set_cookie(&response, "auth").is_none());
}

#[tokio::test]
async fn test_saml_relay_state_from_another_session_is_forbidden() {
    let app = app(with_saml(base_config()), Tenant::new("Acme", HOST_NAME)).await;

    let (_cookie, relay_state) = start_saml_login(&app, "/posts/7").await;
    let request_id = app.state.jwt().decode_state(&relay_state).unwrap().request_id;

    let response = app
        .post_acs(
            &saml_response(&request_id),
            &relay_state,
            "feedback_session=someone-elses-session-id",
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(set_cookie(&response, "auth").is_none());
    assert!(app.users.is_empty().await);
}

#[tokio::test]
async fn test_saml_response_to_unknown_request_is_forbidden() {
    let app = app(with_saml(base_config()), Tenant::new("Acme", HOST_NAME)).await;

    let (cookie, relay_state) = start_saml_login(&app, "/").await;
    let response = app
        .post_acs(&saml_response("id-foreign"), &relay_state, &cookie)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(set_cookie(&response, "auth").is_none());
}

#[tokio::test]
async fn test_saml_tampered_relay_state_is_forbidden() {
    let app = app(with_saml(base_config()), Tenant::new("Acme", HOST_NAME)).await;

    let (cookie, relay_state) = start_saml_login(&app, "/").await;
    let mut tampered = relay_state.into_bytes();
    let at = tampered.len() - 10;
    tampered[at] = if tampered[at] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let response = app
        .post_acs(&saml_response("id-1"), &tampered, &cookie)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_metadata_is_served_with_metadata_content_type() {
    let app = app(with_saml(base_config()), Tenant::new("Acme", HOST_NAME)).await;

    let response = app.get("/saml/metadata", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/samlmetadata+xml"
    );

    let body = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    let xml = String::from_utf8(body.to_vec()).unwrap();
    assert!(xml.contains(&format!("entityID=\"{METADATA_URL}\"")));
    assert!(xml.contains(ACS_URL));
}

#[tokio::test]
async fn test_unconfigured_protocols_are_not_found() {
    let app = app(base_config(), Tenant::new("Acme", HOST_NAME)).await;

    for uri in ["/cas/login", "/cas/callback?ticket=ST-1", "/saml/login", "/saml/metadata"] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_unknown_host_is_not_found() {
    let server = MockServer::start().await;
    let app = app(with_cas(base_config(), &server), Tenant::new("Acme", HOST_NAME)).await;

    let request = Request::get("/cas/login")
        .header(HOST, "other.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_noindex() {
    let server = MockServer::start().await;
    let app = app(with_cas(base_config(), &server), Tenant::new("Acme", HOST_NAME)).await;

    for uri in ["/cas/login", "/saml/metadata"] {
        let response = app.get(uri, None).await;
        assert_eq!(
            response.headers().get("x-robots-tag").unwrap(),
            "noindex",
            "{uri}"
        );
    }
}
