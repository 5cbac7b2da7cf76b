//! # Feedback Board Tenancy
//!
//! Tenant and user models shared by every sign-in flow of the feedback board.
//!
//! ## Overview
//!
//! The feedback-org crate handles:
//! - **Tenants**: One feedback site per host, optionally private (invite-only)
//! - **Users**: Tenant-scoped accounts with a role and a set of provider links
//! - **Provider links**: `(provider, external uid)` pairs binding an account to a federated identity
//! - **Stores**: Async persistence seams with in-memory implementations
//!
//! ## Architecture
//!
//! ```text
//! Tenant (host, is_private)
//!   └─ User (email, name, role)
//!        └─ ProviderLink (provider, uid)   unique per tenant
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use feedback_org::{ProviderLink, ProviderName, Tenant, User};
//!
//! let tenant = Tenant::new("Acme Feedback", "feedback.acme.com");
//! let user = User::new_visitor(
//!     tenant.id,
//!     "Jane Doe",
//!     "jane@acme.com",
//!     ProviderLink::new(ProviderName::Saml, "jane-1"),
//! );
//! assert!(user.has_link(ProviderName::Saml, "jane-1"));
//! ```

pub mod error;
pub mod roles;
pub mod store;
pub mod tenant;
pub mod user;

pub use error::{StoreError, StoreResult};
pub use roles::Role;
pub use store::{MemoryTenantStore, MemoryUserStore, TenantStore, UserStore};
pub use tenant::Tenant;
pub use user::{ProviderLink, ProviderName, User};
