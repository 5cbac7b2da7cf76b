//! Route table for the sign-in endpoints.

use axum::http::header::HeaderName;
use axum::http::HeaderValue;
use axum::middleware::map_response;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{cas, saml};
use crate::state::AppState;

pub const CAS_LOGIN_PATH: &str = "/cas/login";
pub const CAS_CALLBACK_PATH: &str = "/cas/callback";
pub const SAML_LOGIN_PATH: &str = "/saml/login";
pub const SAML_ACS_PATH: &str = "/saml/acs";
pub const SAML_METADATA_PATH: &str = "/saml/metadata";

const X_ROBOTS_TAG: HeaderName = HeaderName::from_static("x-robots-tag");

/// Build the router for all sign-in endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CAS_LOGIN_PATH, get(cas::login))
        .route(CAS_CALLBACK_PATH, get(cas::callback))
        .route(SAML_LOGIN_PATH, get(saml::login))
        .route(SAML_ACS_PATH, post(saml::acs))
        .route(SAML_METADATA_PATH, get(saml::metadata))
        .layer(map_response(noindex))
        .with_state(state)
}

/// Keep sign-in endpoints out of search indexes.
async fn noindex(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(X_ROBOTS_TAG, HeaderValue::from_static("noindex"));
    response
}
