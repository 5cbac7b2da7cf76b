//! # Feedback Board Federated Sign-In
//!
//! Protocol adapters and account linking behind the board's SSO endpoints.
//!
//! ## Overview
//!
//! - **SAML 2.0**: service provider issuing AuthnRequests over the redirect
//!   binding and validating POSTed responses ([`saml`])
//! - **CAS 2.0**: login redirects and service ticket validation ([`cas`])
//! - **Login state**: per-attempt state bound to the browser session, carried
//!   either as a signed token or in a server-side cache ([`login_state`])
//! - **Identity resolution**: provider match, email match and link, or
//!   provisioning, subject to tenant privacy ([`resolver`])
//! - **Sessions**: HS256 session tokens for signed-in users ([`jwt`])
//!
//! ## Flow
//!
//! ```text
//! login ──► LoginStateCarrier::issue ──► IdP / CAS server
//!                                             │
//! callback ◄──────────────────────────────────┘
//!   ├─ LoginStateCarrier::resolve   (session binding, expiry)
//!   ├─ SAML / CAS validation        → ExternalProfile
//!   ├─ IdentityResolver::resolve    → User
//!   └─ JwtService::issue_session    → session cookie
//! ```
//!
//! ## Feature Flags
//!
//! - `redis`: Redis-backed [`cache::StateCache`]

pub mod cache;
pub mod cas;
pub mod claims;
pub mod config;
pub mod error;
pub mod jwt;
pub mod login_state;
pub mod profile;
pub mod resolver;
pub mod saml;

pub use cache::{MemoryStateCache, StateCache};
#[cfg(feature = "redis")]
pub use cache::RedisStateCache;
pub use cas::CasClient;
pub use claims::{SessionClaims, SignedStateClaims};
pub use config::{CasConfig, SamlConfig, SsoConfig};
pub use error::{AuthError, AuthResult};
pub use jwt::{JwtConfig, JwtService};
pub use login_state::{CachedStateCarrier, LoginState, LoginStateCarrier, SignedStateCarrier};
pub use profile::ExternalProfile;
pub use resolver::{IdentityResolver, Resolution, ResolvedIdentity};
pub use saml::{extract_profile, SamlAdapter, SamlAssertion, SamlServiceProvider};
