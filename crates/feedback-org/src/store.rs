//! Tenant and user persistence
//!
//! The sign-in flows only talk to storage through [`UserStore`] and
//! [`TenantStore`]. A store must enforce uniqueness of
//! `(tenant, provider, uid)` atomically and report violations as
//! [`StoreError::Conflict`]; callers treat that as "someone else just
//! created it" and resolve again.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::tenant::Tenant;
use crate::user::{ProviderLink, ProviderName, User};

/// Persistence for tenant-scoped users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find the user owning `(provider, uid)` within a tenant.
    async fn find_by_provider(
        &self,
        tenant_id: Uuid,
        provider: ProviderName,
        uid: &str,
    ) -> StoreResult<Option<User>>;

    /// Find a user by email within a tenant (ASCII case-insensitive).
    async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> StoreResult<Option<User>>;

    /// Find a user by id within a tenant.
    async fn find_by_id(&self, tenant_id: Uuid, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Insert a new user.
    ///
    /// Fails with [`StoreError::Conflict`] if any of its provider links is
    /// already owned by another user of the same tenant.
    async fn register(&self, user: User) -> StoreResult<User>;

    /// Append a provider link to an existing user.
    ///
    /// Linking an identity the user already holds is a no-op. Fails with
    /// [`StoreError::Conflict`] if another user of the tenant owns it.
    async fn add_provider(&self, tenant_id: Uuid, user_id: Uuid, link: ProviderLink)
        -> StoreResult<User>;
}

/// Lookup of tenants by the host they are served under.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find the tenant serving a `Host` header value.
    async fn find_by_host(&self, host: &str) -> StoreResult<Option<Tenant>>;
}

/// In-memory user store.
///
/// Every mutation runs its uniqueness check and its write under a single
/// write lock.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl std::fmt::Debug for MemoryUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryUserStore").finish_non_exhaustive()
    }
}

impl MemoryUserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users across all tenants.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Check whether the store holds no users.
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// All users of a tenant.
    pub async fn list(&self, tenant_id: Uuid) -> Vec<User> {
        self.users
            .read()
            .await
            .values()
            .filter(|u| u.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

fn link_owner<'a>(
    users: &'a HashMap<Uuid, User>,
    tenant_id: Uuid,
    provider: ProviderName,
    uid: &str,
) -> Option<&'a User> {
    users
        .values()
        .find(|u| u.tenant_id == tenant_id && u.has_link(provider, uid))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_provider(
        &self,
        tenant_id: Uuid,
        provider: ProviderName,
        uid: &str,
    ) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(link_owner(&users, tenant_id, provider, uid).cloned())
    }

    async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> StoreResult<Option<User>> {
        if email.is_empty() {
            return Ok(None);
        }
        let users = self.users.read().await;
        let mut matches: Vec<&User> = users
            .values()
            .filter(|u| u.tenant_id == tenant_id && u.email.eq_ignore_ascii_case(email))
            .collect();
        matches.sort_by_key(|u| u.created_at);
        Ok(matches.first().map(|u| (*u).clone()))
    }

    async fn find_by_id(&self, tenant_id: Uuid, user_id: Uuid) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .get(&user_id)
            .filter(|u| u.tenant_id == tenant_id)
            .cloned())
    }

    async fn register(&self, user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
        }
        for link in &user.providers {
            if let Some(owner) = link_owner(&users, user.tenant_id, link.provider, &link.uid) {
                return Err(StoreError::Conflict(format!(
                    "{} identity already linked to user {}",
                    link.provider, owner.id
                )));
            }
        }

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn add_provider(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        link: ProviderLink,
    ) -> StoreResult<User> {
        let mut users = self.users.write().await;

        if let Some(owner) = link_owner(&users, tenant_id, link.provider, &link.uid) {
            if owner.id == user_id {
                return Ok(owner.clone());
            }
            return Err(StoreError::Conflict(format!(
                "{} identity already linked to user {}",
                link.provider, owner.id
            )));
        }

        let user = users
            .get_mut(&user_id)
            .filter(|u| u.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.providers.push(link);
        Ok(user.clone())
    }
}

/// In-memory tenant registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryTenantStore {
    tenants: Arc<RwLock<Vec<Tenant>>>,
}

impl MemoryTenantStore {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tenant.
    pub async fn insert(&self, tenant: Tenant) {
        self.tenants.write().await.push(tenant);
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn find_by_host(&self, host: &str) -> StoreResult<Option<Tenant>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.iter().find(|t| t.serves_host(host)).cloned())
    }
}
