//! `X-API-Key` enforcement middleware (spec.md §6): every request needs a
//! valid key unless the server was started in no-auth mode.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::{AppError, ServerError};
use crate::server::state::AppState;

pub async fn require_api_key(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let presented = request.headers().get("x-api-key").and_then(|v| v.to_str().ok());

    match state.authorize(presented) {
        Ok(tier) => {
            request.extensions_mut().insert(tier.cloned());
            next.run(request).await
        }
        Err(()) => {
            let err = if presented.is_none() { AppError::Server(ServerError::NoApiKey) } else { AppError::Server(ServerError::AuthFailed { message: "unknown API key".to_string() }) };
            axum::response::IntoResponse::into_response(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ApiKeyConfig, Config};
    use crate::download::DownloadJobManager;
    use crate::remote::auth::StaticServiceLocator;
    use crate::services::CircuitBreakerPool;

    async fn state_with_keys(api_secret: Option<&str>, keys: Vec<ApiKeyConfig>) -> AppState {
        let mut config = Config::default();
        config.serve.api_secret = api_secret.map(str::to_string);
        config.serve.api_keys = keys;
        let config = Arc::new(config);
        let dir = tempfile::tempdir().unwrap();
        let work_dirs = sandboxed_file_manager::SandboxedManager::builder().base_directory(dir.keep()).build().await.unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let session_cache = Arc::new(crate::session::LocalSessionCache::open(cache_dir.keep()).await.unwrap());
        AppState {
            client_factory: Arc::new(crate::http::ClientFactory::new(config.clone(), Arc::new(CircuitBreakerPool::new(Default::default())))),
            registry: Arc::new(crate::service::ServiceRegistry::new()),
            locator: Arc::new(StaticServiceLocator::new(Default::default())),
            jobs: Arc::new(DownloadJobManager::new(1, work_dirs)),
            session_cache,
            config,
        }
    }

    #[tokio::test]
    async fn no_auth_mode_allows_missing_key() {
        let state = state_with_keys(None, vec![]).await;
        assert!(state.authorize(None).is_ok());
    }

    #[tokio::test]
    async fn master_secret_grants_unrestricted_access() {
        let state = state_with_keys(Some("root-secret"), vec![]).await;
        assert!(matches!(state.authorize(Some("root-secret")), Ok(None)));
    }

    #[tokio::test]
    async fn unknown_key_rejected_when_auth_required() {
        let state = state_with_keys(Some("root-secret"), vec![]).await;
        assert!(state.authorize(Some("wrong")).is_err());
        assert!(state.authorize(None).is_err());
    }
}
