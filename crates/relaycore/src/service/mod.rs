//! Service capability interface and registry (spec.md §4.3/§4.9).

pub mod file_adapter;
pub mod registry;

pub use file_adapter::LocalFileAdapter;
pub use registry::ServiceRegistry;

use async_trait::async_trait;

use crate::errors::ProxyResult;
use crate::models::{Chapter, ServiceDescriptor, SessionRecord, Title, Track};

/// Capability interface every media-acquisition adapter implements,
/// regardless of whether it runs in-process (local) or is reached through a
/// Remote Service Proxy.
#[async_trait]
pub trait Service: Send + Sync {
    fn descriptor(&self) -> &ServiceDescriptor;

    async fn authenticate(&self, credential: &crate::models::Credential) -> ProxyResult<SessionRecord>;

    async fn search(&self, session: &SessionRecord, query: &str) -> ProxyResult<Vec<Title>>;

    async fn titles(&self, session: &SessionRecord, title_id: &str) -> ProxyResult<Vec<Title>>;

    async fn tracks(&self, session: &SessionRecord, title: &Title) -> ProxyResult<Vec<Track>>;

    async fn chapters(&self, session: &SessionRecord, title: &Title) -> ProxyResult<Vec<Chapter>>;
}
