//! Service layer: orchestration between the HTTP handlers and the engine's
//! core components (session cache, remote proxy, registry).

pub mod circuit_breaker_pool;

pub use circuit_breaker_pool::CircuitBreakerPool;
