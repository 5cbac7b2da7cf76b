//! Identity resolution and account linking
//!
//! Shared by every protocol: turns an [`ExternalProfile`] from a provider
//! into a tenant user.
//!
//! 1. Match by `(provider, profile.id)`.
//! 2. Else match by email and link the identity to that user.
//! 3. Else refuse on private tenants.
//! 4. Else provision a visitor carrying the identity as its first link.
//!
//! On success the returned user always holds the `(provider, profile.id)`
//! link, so step 1 answers every later login by the same identity.

use std::sync::Arc;
use tracing::{info, warn};

use feedback_org::{ProviderLink, ProviderName, Tenant, User, UserStore};

use crate::error::{AuthError, AuthResult};
use crate::profile::ExternalProfile;

/// How a login was matched to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The identity was already linked
    Existing,
    /// Matched by email; the identity was linked just now
    Linked,
    /// A new account was created
    Provisioned,
}

/// A resolved user and how it was found.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub user: User,
    pub resolution: Resolution,
}

/// Resolves external identities to tenant users.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Create a resolver over a user store.
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Resolve `profile` from `provider` to a user of `tenant`.
    ///
    /// A uniqueness conflict means a concurrent login created or linked the
    /// same identity; resolution runs once more and a second conflict is a
    /// [`AuthError::ValidationFailed`].
    pub async fn resolve(
        &self,
        tenant: &Tenant,
        provider: ProviderName,
        profile: &ExternalProfile,
    ) -> AuthResult<ResolvedIdentity> {
        if !profile.has_subject() {
            return Err(AuthError::ValidationFailed(
                "external profile has no subject identifier".to_string(),
            ));
        }

        match self.try_resolve(tenant, provider, profile).await {
            Err(AuthError::AccountLinkRace) => {
                warn!(
                    tenant_id = %tenant.id,
                    provider = %provider,
                    "Concurrent provisioning detected, resolving again"
                );
                self.try_resolve(tenant, provider, profile)
                    .await
                    .map_err(|e| match e {
                        AuthError::AccountLinkRace => AuthError::ValidationFailed(
                            "account provisioning kept colliding".to_string(),
                        ),
                        other => other,
                    })
            }
            result => result,
        }
    }

    async fn try_resolve(
        &self,
        tenant: &Tenant,
        provider: ProviderName,
        profile: &ExternalProfile,
    ) -> AuthResult<ResolvedIdentity> {
        if let Some(user) = self
            .users
            .find_by_provider(tenant.id, provider, &profile.id)
            .await?
        {
            return Ok(ResolvedIdentity {
                user,
                resolution: Resolution::Existing,
            });
        }

        if !profile.email.is_empty() {
            if let Some(user) = self.users.find_by_email(tenant.id, &profile.email).await? {
                if user.has_link(provider, &profile.id) {
                    return Ok(ResolvedIdentity {
                        user,
                        resolution: Resolution::Existing,
                    });
                }
                let user = self
                    .users
                    .add_provider(tenant.id, user.id, ProviderLink::new(provider, &profile.id))
                    .await?;
                info!(
                    tenant_id = %tenant.id,
                    user_id = %user.id,
                    provider = %provider,
                    "Linked external identity by email"
                );
                return Ok(ResolvedIdentity {
                    user,
                    resolution: Resolution::Linked,
                });
            }
        }

        if tenant.is_private {
            info!(tenant_id = %tenant.id, provider = %provider, "Unknown identity on private tenant");
            return Err(AuthError::NotInvited);
        }

        let user = self
            .users
            .register(User::new_visitor(
                tenant.id,
                &profile.name,
                &profile.email,
                ProviderLink::new(provider, &profile.id),
            ))
            .await?;
        info!(
            tenant_id = %tenant.id,
            user_id = %user.id,
            provider = %provider,
            "Provisioned user from external identity"
        );
        Ok(ResolvedIdentity {
            user,
            resolution: Resolution::Provisioned,
        })
    }
}
