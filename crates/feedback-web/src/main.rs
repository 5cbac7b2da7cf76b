use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use feedback_auth::{MemoryStateCache, SsoConfig, StateCache};
use feedback_org::{MemoryTenantStore, MemoryUserStore, Tenant};
use feedback_web::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,feedback_web=debug,feedback_auth=debug")),
        )
        .init();

    let config = SsoConfig::from_env();
    config.validate().context("invalid sign-in configuration")?;

    let tenants = MemoryTenantStore::new();
    let tenant = seed_tenant(&config)?;
    info!(
        tenant_id = %tenant.id,
        host = %tenant.host,
        private = tenant.is_private,
        "Serving tenant"
    );
    tenants.insert(tenant).await;

    let cache = state_cache(&config).await?;
    let state = AppState::new(
        config,
        Arc::new(MemoryUserStore::new()),
        Arc::new(tenants),
        cache,
    )
    .context("failed to initialise sign-in adapters")?;

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Tenant from `TENANT_HOST`, `TENANT_NAME` and `TENANT_PRIVATE`.
///
/// The host defaults to the host of `BASE_URL`.
fn seed_tenant(config: &SsoConfig) -> anyhow::Result<Tenant> {
    let host = match std::env::var("TENANT_HOST") {
        Ok(host) if !host.trim().is_empty() => host,
        _ => Url::parse(config.base_url())
            .context("BASE_URL is not a URL")?
            .host_str()
            .map(str::to_string)
            .context("BASE_URL has no host")?,
    };
    let name = std::env::var("TENANT_NAME").unwrap_or_else(|_| "Feedback".to_string());
    let tenant = Tenant::new(name, host);

    Ok(match std::env::var("TENANT_PRIVATE").as_deref() {
        Ok("1") | Ok("true") => tenant.private(),
        _ => tenant,
    })
}

async fn state_cache(config: &SsoConfig) -> anyhow::Result<Arc<dyn StateCache>> {
    #[cfg(feature = "redis")]
    if let Some(url) = &config.redis_url {
        let cache = feedback_auth::RedisStateCache::connect(url)
            .await
            .context("failed to connect to Redis")?;
        info!("Login state cache: redis");
        return Ok(Arc::new(cache));
    }

    #[cfg(not(feature = "redis"))]
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but this build has no redis support; using memory");
    }

    info!("Login state cache: memory");
    Ok(Arc::new(MemoryStateCache::new()))
}
