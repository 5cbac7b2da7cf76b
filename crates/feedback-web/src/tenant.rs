//! Tenant lookup from the request host.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::ops::Deref;
use tracing::{debug, error};

use feedback_org::Tenant;

use crate::state::AppState;

/// The tenant owning the requested host.
///
/// Unknown hosts are rejected with 404 before any sign-in logic runs.
#[derive(Debug, Clone)]
pub struct CurrentTenant {
    pub tenant: Tenant,
    /// Base URL of the site as addressed by this request (scheme from
    /// `BASE_URL`, host from the `Host` header), without a trailing slash.
    pub base_url: String,
}

impl Deref for CurrentTenant {
    type Target = Tenant;

    fn deref(&self) -> &Tenant {
        &self.tenant
    }
}

fn site_base_url(https: bool, host: &str) -> String {
    let scheme = if https { "https" } else { "http" };
    format!("{scheme}://{host}")
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentTenant {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let host = parts
            .headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(|host| host.trim().to_ascii_lowercase())
            .or_else(|| parts.uri.host().map(str::to_string))
            .ok_or_else(|| StatusCode::NOT_FOUND.into_response())?;

        match state.tenants().find_by_host(&host).await {
            Ok(Some(tenant)) => Ok(Self {
                base_url: site_base_url(state.config().is_https(), &host),
                tenant,
            }),
            Ok(None) => {
                debug!(host = %host, "No tenant for host");
                Err(StatusCode::NOT_FOUND.into_response())
            }
            Err(e) => {
                error!(host = %host, error = %e, "Tenant lookup failed");
                Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}
