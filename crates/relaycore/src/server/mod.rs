//! Remote Service Server (spec.md §4.6/§6): the stateless HTTP surface a
//! Remote Service Proxy talks to, plus the local `/api/services` and
//! `/api/download` surfaces used by direct callers.

pub mod auth;
pub mod handlers;
pub mod response;
pub mod state;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

/// OpenAPI surface description (spec.md §6 ambient concern: a
/// machine-readable API surface even though GUIs are a non-goal).
#[derive(OpenApi)]
#[openapi(
    paths(),
    components(schemas(
        crate::models::ServiceDescriptor,
        crate::models::SessionRecord,
        crate::models::Cookie,
        crate::models::DownloadJob,
        crate::models::DownloadJobStatus,
    )),
    tags((name = "relaycore", description = "Remote-capable service execution engine"))
)]
struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/services", get(handlers::list_services))
        .route("/api/remote/services", get(handlers::list_remote_services))
        .route("/api/remote/{tag}/search", post(handlers::search))
        .route("/api/remote/{tag}/titles", post(handlers::titles))
        .route("/api/remote/{tag}/tracks", post(handlers::tracks))
        .route("/api/remote/{tag}/chapters", post(handlers::chapters))
        .route("/api/remote/{tag}/license", post(handlers::license))
        .route("/api/remote/{tag}/decrypt", post(handlers::decrypt))
        .route("/api/download", post(handlers::submit_download))
        .route("/api/download/jobs", get(handlers::list_download_jobs))
        .route("/api/download/jobs/{id}", get(handlers::get_download_job))
        .route("/api/download/jobs/{id}", delete(handlers::cancel_download_job))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/api/health", get(handlers::health))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
