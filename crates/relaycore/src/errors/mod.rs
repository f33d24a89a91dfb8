//! Centralized error handling for relaycore
//!
//! A single `AppError` unifies the failure modes of every component in the
//! engine; each component gets its own sub-enum (`SessionError`,
//! `ProxyError`, `ServerError`, `RegistryError`) converted in via `#[from]`,
//! and the server layer maps `AppError` onto the wire error taxonomy.

pub mod types;

pub use types::*;

/// Convenience alias for Results using AppError.
pub type AppResult<T> = Result<T, AppError>;

pub type SessionResult<T> = Result<T, SessionError>;
pub type ProxyResult<T> = Result<T, ProxyError>;
pub type ServerResult<T> = Result<T, ServerError>;
pub type RegistryResult<T> = Result<T, RegistryError>;
