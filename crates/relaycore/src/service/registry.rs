//! Service Registry (spec.md §4.9): tracks locally-known service
//! descriptors plus remote service bindings discovered from configured
//! remote servers, under a single case-insensitive tag/alias lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::{Config, RemoteServiceConfig};
use crate::errors::{AppResult, RegistryError};
use crate::http::{ClientFactory, HttpRequest};
use crate::models::{RemoteServiceBinding, ServiceDescriptor};
use crate::remote::proxy::RemoteServiceProxy;
use crate::service::Service;
use crate::session::LocalSessionCache;

#[derive(Debug, serde::Deserialize)]
struct RemoteServicesResponse {
    status: String,
    #[serde(default)]
    services: Vec<ServiceDescriptor>,
}

/// Registry of local service descriptors and discovered remote bindings.
pub struct ServiceRegistry {
    local: RwLock<HashMap<String, ServiceDescriptor>>,
    remote: RwLock<HashMap<String, RemoteServiceBinding>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self { local: RwLock::new(HashMap::new()), remote: RwLock::new(HashMap::new()) }
    }

    pub async fn register_local(&self, descriptor: ServiceDescriptor) {
        self.local.write().await.insert(descriptor.tag.to_ascii_lowercase(), descriptor);
    }

    /// Queries each configured remote server's `/api/remote/services`
    /// endpoint and registers every service it reports under a
    /// `remote_<tag>` key, matching the original's dynamic class registration.
    pub async fn discover_remote(
        &self,
        remote_services: &[RemoteServiceConfig],
        client_factory: &ClientFactory,
    ) -> AppResult<usize> {
        let mut registered = 0;
        for remote in remote_services {
            match self.discover_from_server(remote, client_factory).await {
                Ok(count) => registered += count,
                Err(err) => {
                    tracing::error!(url = %remote.url, error = %err, "failed to discover remote services");
                }
            }
        }
        Ok(registered)
    }

    async fn discover_from_server(
        &self,
        remote: &RemoteServiceConfig,
        client_factory: &ClientFactory,
    ) -> AppResult<usize> {
        let url = remote.url.trim_end_matches('/');
        let client = client_factory.client("default").await?;

        let mut request = HttpRequest::get(format!("{url}/api/remote/services"));
        request.headers.insert("X-API-Key".to_string(), remote.api_key.clone());

        let response = client.execute(request).await.map_err(|e| RegistryError::DiscoveryFailed {
            remote_url: url.to_string(),
            message: e.to_string(),
        })?;

        let body: RemoteServicesResponse = response.json().await.map_err(|e| RegistryError::DiscoveryFailed {
            remote_url: url.to_string(),
            message: e.to_string(),
        })?;

        if body.status != "success" {
            return Err(RegistryError::DiscoveryFailed {
                remote_url: url.to_string(),
                message: format!("unexpected status '{}'", body.status),
            }
            .into());
        }

        let mut count = 0;
        let mut bindings = self.remote.write().await;
        for descriptor in body.services {
            let binding = RemoteServiceBinding {
                remote_url: url.to_string(),
                api_key: remote.api_key.clone(),
                service_tag: descriptor.tag.clone(),
                descriptor,
            };
            bindings.entry(binding.registry_key()).or_insert_with(|| {
                count += 1;
                binding
            });
        }
        Ok(count)
    }

    /// Resolves a user-supplied tag or alias to its canonical form,
    /// searching local services first, then remote bindings, matching
    /// `Services.get_tag`. Returns the original input unmodified if nothing
    /// matches.
    pub async fn resolve_tag(&self, candidate: &str) -> String {
        let lowered = candidate.to_ascii_lowercase();

        let local = self.local.read().await;
        for descriptor in local.values() {
            if descriptor.matches_tag(&lowered) {
                return descriptor.tag.clone();
            }
        }
        drop(local);

        let remote = self.remote.read().await;
        for binding in remote.values() {
            if binding.descriptor.matches_tag(&lowered) || binding.registry_key().eq_ignore_ascii_case(&lowered) {
                return binding.service_tag.clone();
            }
        }

        candidate.to_string()
    }

    pub async fn get_local(&self, tag: &str) -> Option<ServiceDescriptor> {
        self.local.read().await.get(&tag.to_ascii_lowercase()).cloned()
    }

    pub async fn get_remote(&self, remote_key: &str) -> Option<RemoteServiceBinding> {
        self.remote.read().await.get(&remote_key.to_ascii_lowercase()).cloned()
    }

    /// Resolves a canonical (already-`resolve_tag`-ed) service tag to a
    /// `RemoteServiceProxy` over its discovered binding, returned as the
    /// same `Arc<dyn Service>` a local adapter would be — callers dispatch
    /// through the interface without knowing which one they got
    /// (spec.md §4.3/§9).
    pub async fn resolve_remote_service(
        &self,
        tag: &str,
        client_factory: Arc<ClientFactory>,
        session_cache: Arc<LocalSessionCache>,
        config: Arc<Config>,
    ) -> Option<Arc<dyn Service>> {
        let binding = self.get_remote(&format!("remote_{tag}")).await?;
        let descriptor = binding.descriptor.clone();
        let proxy = RemoteServiceProxy::new(
            binding.remote_url,
            binding.api_key,
            binding.service_tag,
            "default",
            client_factory,
            session_cache,
            config,
        )
        .with_descriptor(descriptor);
        Some(Arc::new(proxy))
    }

    pub async fn list_local(&self) -> Vec<ServiceDescriptor> {
        self.local.read().await.values().cloned().collect()
    }

    pub async fn list_remote(&self) -> Vec<RemoteServiceBinding> {
        self.remote.read().await.values().cloned().collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedServiceRegistry = Arc<ServiceRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(tag: &str, aliases: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor {
            tag: tag.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            geofence: vec![],
            title_regex: vec![],
            help: String::new(),
            url: String::new(),
        }
    }

    #[tokio::test]
    async fn resolves_alias_case_insensitively() {
        let registry = ServiceRegistry::new();
        registry.register_local(descriptor("ATVP", &["appletv"])).await;
        assert_eq!(registry.resolve_tag("AppleTV").await, "ATVP");
        assert_eq!(registry.resolve_tag("atvp").await, "ATVP");
    }

    #[tokio::test]
    async fn unresolved_tag_is_returned_verbatim() {
        let registry = ServiceRegistry::new();
        assert_eq!(registry.resolve_tag("unknown").await, "unknown");
    }
}
