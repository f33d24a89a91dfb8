//! Remote Auth Orchestrator (spec.md §4.7): runs a local service's
//! authentication step on the CLIENT, then hands the resulting Session
//! Record to the caller for upload — the remote server never sees
//! credentials, only authenticated sessions, mirroring the original's
//! `RemoteAuthenticator`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{AppError, AppResult};
use crate::http::ClientFactory;
use crate::models::{Credential, SessionRecord};
use crate::service::Service;

/// Looks up a locally-registered `Service` implementation by tag. Kept as
/// a trait so the orchestrator doesn't need to know how adapters are
/// loaded (static registration, plugin discovery, etc.).
#[async_trait]
pub trait LocalServiceLocator: Send + Sync {
    async fn find(&self, service_tag: &str) -> Option<Arc<dyn Service>>;
}

/// A locator backed by a fixed in-memory map, useful for tests and for
/// engines with a small, statically-known set of local adapters.
pub struct StaticServiceLocator {
    services: HashMap<String, Arc<dyn Service>>,
}

impl StaticServiceLocator {
    pub fn new(services: HashMap<String, Arc<dyn Service>>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl LocalServiceLocator for StaticServiceLocator {
    async fn find(&self, service_tag: &str) -> Option<Arc<dyn Service>> {
        self.services.get(&service_tag.to_ascii_lowercase()).cloned()
    }
}

pub struct RemoteAuthOrchestrator {
    remote_url: String,
    api_key: String,
    #[allow(dead_code)]
    client_factory: Arc<ClientFactory>,
    locator: Option<Arc<dyn LocalServiceLocator>>,
    credential: Option<Credential>,
}

impl RemoteAuthOrchestrator {
    pub fn new(remote_url: impl Into<String>, api_key: impl Into<String>, client_factory: Arc<ClientFactory>) -> Self {
        Self {
            remote_url: remote_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client_factory,
            locator: None,
            credential: None,
        }
    }

    pub fn with_locator(mut self, locator: Arc<dyn LocalServiceLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Authenticates `service_tag` locally and returns the resulting
    /// Session Record, tagged with `service_tag`/`profile` the way the
    /// caller's Local Session Cache key expects.
    pub async fn authenticate_service_locally(&self, service_tag: &str, profile: &str) -> AppResult<SessionRecord> {
        let locator = self
            .locator
            .as_ref()
            .ok_or_else(|| AppError::internal("remote auth orchestrator has no local service locator configured"))?;

        let service = locator
            .find(service_tag)
            .await
            .ok_or_else(|| AppError::not_found("service", service_tag))?;

        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| AppError::validation(format!("no credential available to authenticate '{service_tag}'")))?;

        tracing::info!(service_tag, remote_url = %self.remote_url, "authenticating service locally for remote upload");

        let mut session = service.authenticate(credential).await.map_err(AppError::from)?;
        session.service_tag = service_tag.to_string();
        session.profile = profile.to_string();
        session.authenticated = true;

        tracing::info!(service_tag, profile, "local authentication succeeded");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProxyResult;
    use crate::models::{Chapter, ServiceDescriptor, Title, Track};

    struct StubService {
        descriptor: ServiceDescriptor,
    }

    #[async_trait]
    impl Service for StubService {
        fn descriptor(&self) -> &ServiceDescriptor {
            &self.descriptor
        }

        async fn authenticate(&self, _credential: &Credential) -> ProxyResult<SessionRecord> {
            let mut record = SessionRecord::new("stub", "default", 0);
            record.headers.insert("Authorization".to_string(), "Bearer abc".to_string());
            Ok(record)
        }

        async fn search(&self, _session: &SessionRecord, _query: &str) -> ProxyResult<Vec<Title>> {
            Ok(vec![])
        }

        async fn titles(&self, _session: &SessionRecord, _title_id: &str) -> ProxyResult<Vec<Title>> {
            Ok(vec![])
        }

        async fn tracks(&self, _session: &SessionRecord, _title: &Title) -> ProxyResult<Vec<Track>> {
            Ok(vec![])
        }

        async fn chapters(&self, _session: &SessionRecord, _title: &Title) -> ProxyResult<Vec<Chapter>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn authenticates_and_tags_session() {
        let descriptor = ServiceDescriptor {
            tag: "stub".into(),
            aliases: vec![],
            geofence: vec![],
            title_regex: vec![],
            help: String::new(),
            url: String::new(),
        };
        let mut services: HashMap<String, Arc<dyn Service>> = HashMap::new();
        services.insert("stub".into(), Arc::new(StubService { descriptor }));
        let locator = Arc::new(StaticServiceLocator::new(services));

        let factory = Arc::new(ClientFactory::new(
            Arc::new(crate::config::Config::default()),
            Arc::new(crate::services::CircuitBreakerPool::new(Default::default())),
        ));

        let orchestrator = RemoteAuthOrchestrator::new("https://remote", "key", factory)
            .with_locator(locator)
            .with_credential(Credential { username: "u".into(), password: "p".into() });

        let session = orchestrator.authenticate_service_locally("stub", "default").await.unwrap();
        assert_eq!(session.service_tag, "stub");
        assert_eq!(session.profile, "default");
        assert!(session.authenticated);
    }
}
