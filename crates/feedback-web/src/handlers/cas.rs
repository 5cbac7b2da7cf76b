//! CAS login and callback.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{info, instrument};

use feedback_auth::{AuthError, LoginState, LoginStateCarrier};
use feedback_org::ProviderName;

use super::{already_signed_in, complete_sign_in};
use crate::failure::{FlowError, FlowResultExt, CAS_FAILED};
use crate::redirect::confine_redirect;
use crate::session::BrowserSession;
use crate::state::AppState;
use crate::tenant::CurrentTenant;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub ticket: Option<String>,
    #[serde(default)]
    pub redirect: Option<String>,
}

/// `GET /cas/login`
#[instrument(skip_all, fields(tenant_id = %tenant.id))]
pub async fn login(
    State(state): State<AppState>,
    tenant: CurrentTenant,
    session: BrowserSession,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Result<Response, FlowError> {
    let cas = state.cas();
    if !cas.is_configured() {
        return Err(FlowError::new(AuthError::NotConfigured, CAS_FAILED));
    }

    let target =
        confine_redirect(&tenant.base_url, query.redirect.as_deref()).or_fail_with(CAS_FAILED)?;

    if let Some(response) = already_signed_in(&state, &headers, &tenant, &target) {
        return Ok(response);
    }

    state
        .cas_state()
        .issue(LoginState::redirect(target.as_str()), &session.id)
        .await
        .or_fail_with(CAS_FAILED)?;
    let login_url = cas.build_login_url(&tenant.base_url, &target).or_fail_with(CAS_FAILED)?;

    info!("Redirecting to CAS");
    Ok(session.attach(
        Redirect::to(&login_url).into_response(),
        state.config().is_https(),
    ))
}

/// `GET /cas/callback`
#[instrument(skip_all, fields(tenant_id = %tenant.id))]
pub async fn callback(
    State(state): State<AppState>,
    tenant: CurrentTenant,
    session: BrowserSession,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, FlowError> {
    let cas = state.cas();
    if !cas.is_configured() {
        return Err(FlowError::new(AuthError::NotConfigured, CAS_FAILED));
    }

    let ticket = query.ticket.as_deref().map(str::trim).unwrap_or_default();
    if ticket.is_empty() {
        return Err(FlowError::new(
            AuthError::ValidationFailed("callback without ticket".into()),
            CAS_FAILED,
        ));
    }

    let profile = cas
        .validate_ticket(
            ticket,
            &tenant.base_url,
            query.redirect.as_deref().unwrap_or_default(),
        )
        .await
        .or_fail_with(CAS_FAILED)?;

    let login = state
        .cas_state()
        .resolve("", &session.id)
        .await
        .or_fail_with(CAS_FAILED)?;

    let resolved = state
        .resolver()
        .resolve(&tenant, ProviderName::Cas, &profile)
        .await
        .or_fail_with(CAS_FAILED)?;

    complete_sign_in(
        &state,
        &resolved.user,
        ProviderName::Cas,
        &login.redirect,
        &tenant.base_url,
    )
        .or_fail_with(CAS_FAILED)
}
