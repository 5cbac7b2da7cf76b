//! SAML login, assertion consumer and metadata.

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{error, info, instrument};

use feedback_auth::saml::METADATA_CONTENT_TYPE;
use feedback_auth::{extract_profile, AuthError, LoginStateCarrier};
use feedback_org::ProviderName;

use super::{already_signed_in, complete_sign_in};
use crate::failure::{FlowError, FlowResultExt, SAML_FAILED};
use crate::handlers::cas::LoginQuery;
use crate::redirect::confine_redirect;
use crate::session::BrowserSession;
use crate::state::AppState;
use crate::tenant::CurrentTenant;

/// Form posted by the IdP to the assertion consumer service.
#[derive(Debug, Deserialize)]
pub struct AcsForm {
    #[serde(rename = "SAMLResponse", default)]
    pub saml_response: String,
    #[serde(rename = "RelayState", default)]
    pub relay_state: String,
}

/// `GET /saml/login`
#[instrument(skip_all, fields(tenant_id = %tenant.id))]
pub async fn login(
    State(state): State<AppState>,
    tenant: CurrentTenant,
    session: BrowserSession,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Result<Response, FlowError> {
    if !state.saml().is_configured() {
        return Err(FlowError::new(AuthError::NotConfigured, SAML_FAILED));
    }

    let target = confine_redirect(&tenant.base_url, query.redirect.as_deref())
        .or_fail_with(SAML_FAILED)?;

    if let Some(response) = already_signed_in(&state, &headers, &tenant, &target) {
        return Ok(response);
    }

    let sp = state
        .service_provider(&tenant.base_url)
        .or_fail_with(SAML_FAILED)?;
    let login_url = sp
        .build_login_url(state.saml_state(), &target, &session.id)
        .await
        .or_fail_with(SAML_FAILED)?;

    info!("Redirecting to SAML IdP");
    Ok(session.attach(
        Redirect::to(&login_url).into_response(),
        state.config().is_https(),
    ))
}

/// `POST /saml/acs`
#[instrument(skip_all, fields(tenant_id = %tenant.id))]
pub async fn acs(
    State(state): State<AppState>,
    tenant: CurrentTenant,
    session: BrowserSession,
    form: Result<Form<AcsForm>, FormRejection>,
) -> Result<Response, FlowError> {
    if !state.saml().is_configured() {
        return Err(FlowError::new(AuthError::NotConfigured, SAML_FAILED));
    }

    let Form(form) = form.map_err(|rejection| {
        FlowError::new(
            AuthError::ValidationFailed(format!("unreadable ACS form: {rejection}")),
            SAML_FAILED,
        )
    })?;

    let login = state
        .saml_state()
        .resolve(&form.relay_state, &session.id)
        .await
        .or_fail_with(SAML_FAILED)?;
    let request_id = login.request_id.as_deref().unwrap_or_default();
    if request_id.is_empty() {
        return Err(FlowError::new(
            AuthError::ForgedRequest("relay state without request id".into()),
            SAML_FAILED,
        ));
    }

    if form.saml_response.trim().is_empty() {
        return Err(FlowError::new(
            AuthError::ValidationFailed("empty SAMLResponse".into()),
            SAML_FAILED,
        ));
    }

    let sp = state
        .service_provider(&tenant.base_url)
        .or_fail_with(SAML_FAILED)?;
    let assertion = sp
        .parse_and_validate_response(&form.saml_response, &[request_id])
        .or_fail_with(SAML_FAILED)?;
    let profile = extract_profile(&assertion);

    let resolved = state
        .resolver()
        .resolve(&tenant, ProviderName::Saml, &profile)
        .await
        .or_fail_with(SAML_FAILED)?;

    complete_sign_in(
        &state,
        &resolved.user,
        ProviderName::Saml,
        &login.redirect,
        &tenant.base_url,
    )
        .or_fail_with(SAML_FAILED)
}

/// `GET /saml/metadata`
pub async fn metadata(State(state): State<AppState>, tenant: CurrentTenant) -> Response {
    if !state.saml().is_configured() {
        return StatusCode::NOT_FOUND.into_response();
    }

    match state
        .service_provider(&tenant.base_url)
        .and_then(|sp| sp.build_metadata_xml()) {
        Ok(xml) => ([(CONTENT_TYPE, METADATA_CONTENT_TYPE)], xml).into_response(),
        Err(AuthError::NotConfigured) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render SAML metadata");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
