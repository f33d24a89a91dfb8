//! Wire response envelope (spec.md §6): every handler replies with
//! `{status, ...}` on success or `{status:"error", error_code?, message}`
//! on failure, and HTTP status mirrors severity rather than always 200.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{AppError, ErrorCode, ProxyError, RegistryError, ServerError, SessionError};

/// A successful JSON payload, always carrying `"status":"success"`.
pub struct ApiOk(pub Value);

impl ApiOk {
    pub fn new<T: Serialize>(body: T) -> Self {
        let mut value = serde_json::to_value(body).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = value {
            map.insert("status".to_string(), Value::String("success".to_string()));
        } else {
            let mut map = Map::new();
            map.insert("status".to_string(), Value::String("success".to_string()));
            map.insert("data".to_string(), value);
            value = Value::Object(map);
        }
        Self(value)
    }
}

impl IntoResponse for ApiOk {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.0)).into_response()
    }
}

/// An error envelope, constructed once `AppError` has been mapped to a
/// wire `ErrorCode` (or left untyped for generic 500s).
#[derive(Serialize)]
struct ApiError {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<ErrorCode>,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = http_status_for(&self);
        let error_code = self.error_code();
        let message = redacted_message(&self);
        let body = ApiError { status: "error", error_code, message };
        (status, Json(body)).into_response()
    }
}

fn http_status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Server(ServerError::UnknownService { .. }) => StatusCode::NOT_FOUND,
        AppError::Server(ServerError::InvalidProxy { .. }) => StatusCode::BAD_REQUEST,
        AppError::Server(ServerError::AuthRequired) => StatusCode::UNAUTHORIZED,
        AppError::Server(ServerError::AuthFailed { .. }) => StatusCode::UNAUTHORIZED,
        AppError::Server(ServerError::SessionExpired) => StatusCode::UNAUTHORIZED,
        AppError::Server(ServerError::NotAvailable { .. }) => StatusCode::NOT_FOUND,
        AppError::Server(ServerError::Geofenced) => StatusCode::NOT_FOUND,
        AppError::Server(ServerError::PremiumRequired) => StatusCode::FORBIDDEN,
        AppError::Server(ServerError::CdmNotAllowed { .. }) => StatusCode::FORBIDDEN,
        AppError::Server(ServerError::NoApiKey) => StatusCode::UNAUTHORIZED,
        AppError::Server(ServerError::ServiceError { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::Session(SessionError::Expired { .. }) => StatusCode::UNAUTHORIZED,
        AppError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::Proxy(ProxyError::AuthRequired { .. }) => StatusCode::UNAUTHORIZED,
        AppError::Proxy(ProxyError::AuthFailed { .. }) => StatusCode::UNAUTHORIZED,
        AppError::Proxy(ProxyError::SessionExpired { .. }) => StatusCode::UNAUTHORIZED,
        AppError::Proxy(ProxyError::UnresolvedProxy { .. }) => StatusCode::BAD_REQUEST,
        AppError::Proxy(_) => StatusCode::BAD_GATEWAY,
        AppError::Registry(RegistryError::UnknownTag { .. }) => StatusCode::NOT_FOUND,
        AppError::Registry(_) => StatusCode::BAD_GATEWAY,
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::Http(_) => StatusCode::BAD_GATEWAY,
        AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::Json(_) => StatusCode::BAD_REQUEST,
    }
}

/// Internal failures never leak their cause; only the taxonomy-mapped
/// variants carry a caller-facing message.
fn redacted_message(err: &AppError) -> String {
    match err {
        AppError::Server(inner) => inner.to_string(),
        AppError::Proxy(inner) => inner.to_string(),
        AppError::Registry(inner) => inner.to_string(),
        AppError::Session(SessionError::Expired { .. }) => "session expired".to_string(),
        AppError::Validation { message } => message.clone(),
        AppError::NotFound { resource, id } => format!("{resource} '{id}' not found"),
        _ => "internal error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_service_maps_to_404() {
        let err = AppError::Server(ServerError::UnknownService { tag: "nope".into() });
        assert_eq!(http_status_for(&err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_proxy_maps_to_400() {
        let err = AppError::Server(ServerError::InvalidProxy { token: "nordvpn:ca".into() });
        assert_eq!(http_status_for(&err), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidProxy));
    }

    #[test]
    fn internal_error_message_is_generic() {
        let err = AppError::internal("leaked stack trace detail");
        assert_eq!(redacted_message(&err), "internal error");
    }
}
