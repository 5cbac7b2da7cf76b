//! Sign-in flow handlers.

pub mod cas;
pub mod saml;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{info, warn};

use feedback_auth::AuthResult;
use feedback_org::{ProviderName, Tenant, User};

use crate::redirect::confine_redirect;
use crate::session::{append_cookie, auth_cookie, signed_in_user};
use crate::state::AppState;

/// Redirect target when the browser already carries a session for `tenant`.
pub(crate) fn already_signed_in(
    state: &AppState,
    headers: &HeaderMap,
    tenant: &Tenant,
    target: &str,
) -> Option<Response> {
    let claims = signed_in_user(headers, state.jwt(), tenant)?;
    info!(user_id = %claims.sub, tenant_id = %tenant.id, "Already signed in");
    Some(Redirect::to(target).into_response())
}

/// Sign `user` in and send them to `redirect`.
///
/// Redirects that are empty or outside `site_base` go to the site root.
pub(crate) fn complete_sign_in(
    state: &AppState,
    user: &User,
    provider: ProviderName,
    redirect: &str,
    site_base: &str,
) -> AuthResult<Response> {
    let token = state.jwt().issue_session(user, provider)?;
    let config = state.config();
    let target = confine_redirect(site_base, Some(redirect)).unwrap_or_else(|_| {
        warn!(redirect = %redirect, "Captured redirect is outside the site");
        site_base.to_string()
    });

    let mut response = Redirect::to(&target).into_response();
    append_cookie(
        response.headers_mut(),
        &auth_cookie(
            &token,
            state.jwt().session_ttl().num_seconds(),
            config.is_https(),
        ),
    );

    info!(
        user_id = %user.id,
        tenant_id = %user.tenant_id,
        provider = %provider,
        "User signed in"
    );
    Ok(response)
}
