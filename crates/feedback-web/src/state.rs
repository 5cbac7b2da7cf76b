//! Shared application state.

use std::sync::Arc;

use feedback_auth::{
    AuthResult, CachedStateCarrier, CasClient, IdentityResolver, JwtConfig, JwtService,
    SamlAdapter, SamlServiceProvider, SignedStateCarrier, SsoConfig, StateCache,
};
use feedback_org::{TenantStore, UserStore};

use crate::router::{SAML_ACS_PATH, SAML_METADATA_PATH};

/// State handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: SsoConfig,
    jwt: Arc<JwtService>,
    cas: CasClient,
    saml: SamlAdapter,
    cas_state: CachedStateCarrier,
    saml_state: SignedStateCarrier,
    resolver: IdentityResolver,
    tenants: Arc<dyn TenantStore>,
}

impl AppState {
    /// Wire the adapters from `config` over the given stores.
    pub fn new(
        config: SsoConfig,
        users: Arc<dyn UserStore>,
        tenants: Arc<dyn TenantStore>,
        cache: Arc<dyn StateCache>,
    ) -> AuthResult<Self> {
        let jwt = Arc::new(JwtService::new(JwtConfig::from_sso(&config))?);
        let cas = CasClient::new(&config)?;
        let saml = SamlAdapter::new(&config);
        let cas_state = CachedStateCarrier::for_cas(cache, jwt.state_ttl());
        let saml_state = SignedStateCarrier::new(jwt.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                jwt,
                cas,
                saml,
                cas_state,
                saml_state,
                resolver: IdentityResolver::new(users),
                tenants,
            }),
        })
    }

    pub fn config(&self) -> &SsoConfig {
        &self.inner.config
    }

    pub fn jwt(&self) -> &JwtService {
        &self.inner.jwt
    }

    pub fn cas(&self) -> &CasClient {
        &self.inner.cas
    }

    pub fn saml(&self) -> &SamlAdapter {
        &self.inner.saml
    }

    /// Server-side carrier for the CAS redirect.
    pub fn cas_state(&self) -> &CachedStateCarrier {
        &self.inner.cas_state
    }

    /// Signed relay-state carrier for SAML.
    pub fn saml_state(&self) -> &SignedStateCarrier {
        &self.inner.saml_state
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.inner.resolver
    }

    pub fn tenants(&self) -> &dyn TenantStore {
        self.inner.tenants.as_ref()
    }

    /// Service provider for the metadata and ACS endpoints under `site_base`.
    pub fn service_provider(&self, site_base: &str) -> AuthResult<SamlServiceProvider> {
        self.saml().build_service_provider(
            &format!("{site_base}{SAML_METADATA_PATH}"),
            &format!("{site_base}{SAML_ACS_PATH}"),
        )
    }
}
