//! HTTP Client Facade (spec.md §4.1): a named-profile client factory over
//! pluggable backends, each wrapped with the shared retry policy and an
//! optional circuit breaker drawn from the engine's circuit breaker pool.

pub mod backend;
pub mod retry;

pub use backend::{Client, HttpBackend, HttpRequest, ImpersonatingHttpClient, StandardHttpClient};
pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::{Config, HttpBackendConfig};
use crate::errors::AppError;
use crate::services::CircuitBreakerPool;

/// Builds and caches named HTTP Client Facade instances: `.client("default")`
/// or `.client("license_server")`, each configured from `http.named.<name>`
/// merged over `http.default`.
pub struct ClientFactory {
    config: Arc<Config>,
    breaker_pool: Arc<CircuitBreakerPool>,
    cache: RwLock<HashMap<String, Arc<Client>>>,
}

impl ClientFactory {
    pub fn new(config: Arc<Config>, breaker_pool: Arc<CircuitBreakerPool>) -> Self {
        Self { config, breaker_pool, cache: RwLock::new(HashMap::new()) }
    }

    pub async fn client(&self, name: &str) -> Result<Arc<Client>, AppError> {
        if let Some(existing) = self.cache.read().await.get(name) {
            return Ok(existing.clone());
        }

        let backend_config = self.resolve_backend_config(name);
        let backend: Arc<dyn HttpBackend> = if backend_config.backend == "impersonating" {
            Arc::new(ImpersonatingHttpClient::new(&backend_config)?)
        } else {
            Arc::new(StandardHttpClient::new(&backend_config)?)
        };

        let retry_policy = RetryPolicy::from(&backend_config.retry);
        let circuit_breaker = self.breaker_pool.get_circuit_breaker(name).await.ok();

        let client = Arc::new(Client::new(backend, retry_policy, circuit_breaker));
        self.cache.write().await.insert(name.to_string(), client.clone());
        Ok(client)
    }

    /// Per-named-client circuit breaker stats, surfaced on `/api/health`.
    pub async fn circuit_breaker_health(&self) -> HashMap<String, crate::utils::circuit_breaker::CircuitBreakerStats> {
        self.breaker_pool.get_all_stats().await
    }

    /// Merge order: `http.default` as the base, `http.named.<name>`
    /// overriding any field it sets.
    fn resolve_backend_config(&self, name: &str) -> HttpBackendConfig {
        let mut resolved = self.config.http.default.clone();
        if let Some(named) = self.config.http.named.get(name) {
            if named.backend != HttpBackendConfig::default().backend {
                resolved.backend = named.backend.clone();
            }
            if named.proxy.is_some() {
                resolved.proxy = named.proxy.clone();
            }
            if named.impersonate.is_some() {
                resolved.impersonate = named.impersonate.clone();
            }
            resolved.headers.extend(named.headers.clone());
            resolved.retry = named.retry.clone();
        }
        resolved
    }
}
