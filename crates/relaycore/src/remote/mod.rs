//! Remote Service Proxy (spec.md §4.5) and Remote Auth Orchestrator (§4.7):
//! the client-side half of talking to a Remote Service Server.

pub mod auth;
pub mod proxy;

pub use auth::RemoteAuthOrchestrator;
pub use proxy::RemoteServiceProxy;
