//! Error type definitions for relaycore
//!
//! Layered error system: one crate-wide `AppError` with a `#[from]` sub-enum
//! per component, mirroring how each component's own failure modes are
//! described in isolation before being folded into the wire taxonomy the
//! HTTP layer exposes to clients.

use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Session record / session cache failures
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Remote Service Proxy (client-side) failures
    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Remote Service Server (handler) failures
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Service Registry / discovery failures
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Input validation errors
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Resource not found
    #[error("not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("internal error: {message}")]
    Internal { message: String },

    /// HTTP client errors
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem errors (session cache, materialized manifests)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session Record / Local Session Cache specific errors.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("session expired (cached_at={cached_at})")]
    Expired { cached_at: i64 },

    #[error("session record is invalid: no cookies and no Authorization header")]
    Invalid,

    #[error("session cache io failure: {message}")]
    CacheIo { message: String },
}

/// Remote Service Proxy (client-side) errors — §7 NetworkError / NetworkHTTPError
/// / AuthRequired / AuthFailed / SessionExpired family as seen from the caller.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("http error: status {status}")]
    NetworkHttp { status: u16 },

    #[error("authentication required for service '{service_tag}'")]
    AuthRequired { service_tag: String },

    #[error("authentication failed for service '{service_tag}': {message}")]
    AuthFailed { service_tag: String, message: String },

    #[error("session expired for service '{service_tag}'")]
    SessionExpired { service_tag: String },

    #[error("proxy token '{token}' did not resolve to a qualified http(s) URI")]
    UnresolvedProxy { token: String },

    #[error("connection exhausted after {attempts} attempts")]
    ConnectionExhausted { attempts: u32 },
}

/// Remote Service Server (handler) errors — these are the ones that get
/// mapped directly to the wire `error_code` taxonomy in spec.md §6/§7.
#[derive(Error, Debug, Clone)]
pub enum ServerError {
    #[error("unknown service tag: {tag}")]
    UnknownService { tag: String },

    #[error("invalid proxy token: {token}")]
    InvalidProxy { token: String },

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("session expired")]
    SessionExpired,

    #[error("title not available: {title_id}")]
    NotAvailable { title_id: String },

    #[error("not reachable from this origin (geofenced)")]
    Geofenced,

    #[error("premium tier required")]
    PremiumRequired,

    #[error("cdm '{cdm}' not allowed for this api key")]
    CdmNotAllowed { cdm: String },

    #[error("no api key supplied")]
    NoApiKey,

    #[error("service error: {message}")]
    ServiceError { message: String },
}

/// Service Registry / discovery errors.
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("unknown service tag: {tag}")]
    UnknownTag { tag: String },

    #[error("tag '{tag}' has no local filesystem path (it is a remote service)")]
    NoLocalPath { tag: String },

    #[error("discovery request to {remote_url} failed: {message}")]
    DiscoveryFailed { remote_url: String, message: String },
}

/// Wire-level error codes from spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    SessionExpired,
    AuthRequired,
    InvalidProxy,
    NoApiKey,
    PremiumRequired,
    CdmNotAllowed,
}

impl ErrorCode {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidProxy => "INVALID_PROXY",
            ErrorCode::NoApiKey => "NO_API_KEY",
            ErrorCode::PremiumRequired => "PREMIUM_REQUIRED",
            ErrorCode::CdmNotAllowed => "CDM_NOT_ALLOWED",
        }
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de> serde::Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "SESSION_EXPIRED" => Ok(ErrorCode::SessionExpired),
            "AUTH_REQUIRED" => Ok(ErrorCode::AuthRequired),
            "INVALID_PROXY" => Ok(ErrorCode::InvalidProxy),
            "NO_API_KEY" => Ok(ErrorCode::NoApiKey),
            "PREMIUM_REQUIRED" => Ok(ErrorCode::PremiumRequired),
            "CDM_NOT_ALLOWED" => Ok(ErrorCode::CdmNotAllowed),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &[
                    "SESSION_EXPIRED",
                    "AUTH_REQUIRED",
                    "INVALID_PROXY",
                    "NO_API_KEY",
                    "PREMIUM_REQUIRED",
                    "CDM_NOT_ALLOWED",
                ],
            )),
        }
    }
}

impl AppError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound { resource: resource.into(), id: id.into() }
    }

    /// Wire error code for this error, if the spec's taxonomy names one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Server(ServerError::SessionExpired) => Some(ErrorCode::SessionExpired),
            AppError::Server(ServerError::AuthRequired) => Some(ErrorCode::AuthRequired),
            AppError::Server(ServerError::AuthFailed { .. }) => Some(ErrorCode::AuthRequired),
            AppError::Server(ServerError::InvalidProxy { .. }) => Some(ErrorCode::InvalidProxy),
            AppError::Server(ServerError::NoApiKey) => Some(ErrorCode::NoApiKey),
            AppError::Server(ServerError::PremiumRequired) => Some(ErrorCode::PremiumRequired),
            AppError::Server(ServerError::CdmNotAllowed { .. }) => Some(ErrorCode::CdmNotAllowed),
            AppError::Session(SessionError::Expired { .. }) => Some(ErrorCode::SessionExpired),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_maps_session_expired() {
        let err = AppError::Server(ServerError::SessionExpired);
        assert_eq!(err.error_code(), Some(ErrorCode::SessionExpired));
    }

    #[test]
    fn error_code_none_for_internal() {
        let err = AppError::internal("boom");
        assert_eq!(err.error_code(), None);
    }

    #[test]
    fn wire_str_is_screaming_snake() {
        assert_eq!(ErrorCode::InvalidProxy.as_wire_str(), "INVALID_PROXY");
        assert_eq!(ErrorCode::CdmNotAllowed.as_wire_str(), "CDM_NOT_ALLOWED");
    }
}
