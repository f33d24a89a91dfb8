//! Shared application state for the Remote Service Server (spec.md §4.6).

use std::sync::Arc;

use crate::config::{ApiKeyConfig, Config};
use crate::download::DownloadJobManager;
use crate::http::ClientFactory;
use crate::remote::auth::LocalServiceLocator;
use crate::service::ServiceRegistry;
use crate::session::LocalSessionCache;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ServiceRegistry>,
    pub locator: Arc<dyn LocalServiceLocator>,
    pub client_factory: Arc<ClientFactory>,
    pub jobs: Arc<DownloadJobManager>,
    /// Used only to build `RemoteServiceProxy` instances when a resolved
    /// tag turns out to be a discovered remote binding, not local.
    pub session_cache: Arc<LocalSessionCache>,
}

impl AppState {
    /// Resolves a presented `X-API-Key`. `Ok(None)` means either auth is
    /// disabled or the presented key is the server's master `api_secret`
    /// (unrestricted access, no CDM tier to check). `Ok(Some(cfg))` means
    /// the key matched a tiered entry in `serve.api_keys`. `Err(())` means
    /// auth is required and the presented key matched neither.
    pub fn authorize(&self, presented: Option<&str>) -> Result<Option<&ApiKeyConfig>, ()> {
        if !self.config.serve.requires_api_key() {
            return Ok(None);
        }
        let presented = presented.ok_or(())?;
        if self.config.serve.api_secret.as_deref() == Some(presented) {
            return Ok(None);
        }
        self.config.serve.lookup_api_key(presented).map(Some).ok_or(())
    }
}
