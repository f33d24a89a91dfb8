//! Utility modules shared across the engine.

pub mod circuit_breaker;
pub mod circuit_breaker_noop;
pub mod circuit_breaker_simple;
pub mod jitter;

pub use circuit_breaker::{
    create_circuit_breaker, create_circuit_breaker_for_service, create_circuit_breaker_from_profile,
    CircuitBreaker, CircuitBreakerError, CircuitBreakerState, CircuitBreakerStats,
};
pub use jitter::{generate_jitter_ms, generate_jitter_percent};
