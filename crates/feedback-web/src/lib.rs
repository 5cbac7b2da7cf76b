//! # Feedback Board Sign-In Endpoints
//!
//! Axum handlers driving the CAS and SAML flows from `feedback-auth`.
//!
//! | Route               | Method | Purpose                          |
//! |---------------------|--------|----------------------------------|
//! | `/cas/login`        | GET    | Start a CAS login                |
//! | `/cas/callback`     | GET    | Validate the service ticket      |
//! | `/saml/login`       | GET    | Send an AuthnRequest to the IdP  |
//! | `/saml/acs`         | POST   | Consume the IdP's response       |
//! | `/saml/metadata`    | GET    | Service provider metadata        |
//!
//! Every response carries `X-Robots-Tag: noindex`.

pub mod failure;
pub mod handlers;
pub mod redirect;
pub mod router;
pub mod session;
pub mod state;
pub mod tenant;

pub use failure::FlowError;
pub use router::router;
pub use state::AppState;
pub use tenant::CurrentTenant;
