//! Session Record (de)serialization and the client-side Local Session Cache
//! (spec.md §4.2/§4.4).

pub mod cache;
pub mod tokens;

pub use cache::LocalSessionCache;
pub use tokens::{apply_session_tokens, extract_session_tokens};

use std::collections::HashMap;

use crate::errors::{SessionError, SessionResult};
use crate::models::{Cookie, SessionRecord};

/// Header names excluded from a Session Record because they are
/// server/proxy-specific and must not leak between hops.
const EXCLUDED_HEADERS: &[&str] = &["proxy-authorization"];

/// Build a Session Record from raw cookie/header maps, the way the remote
/// server assembles one after a successful adapter authentication.
pub fn build_session_record(
    service_tag: impl Into<String>,
    profile: impl Into<String>,
    cookies: HashMap<String, Cookie>,
    headers: HashMap<String, String>,
    cached_at: i64,
) -> SessionRecord {
    let mut record = SessionRecord::new(service_tag, profile, cached_at);
    record.cookies = cookies;
    record.headers = filter_excluded_headers(headers);
    record.authenticated = record.is_valid();
    record
}

/// Strips headers that must never be carried inside a portable Session
/// Record, matching the original serializer's proxy-authorization exclusion.
pub fn filter_excluded_headers(headers: HashMap<String, String>) -> HashMap<String, String> {
    headers
        .into_iter()
        .filter(|(k, _)| !EXCLUDED_HEADERS.iter().any(|excluded| k.eq_ignore_ascii_case(excluded)))
        .collect()
}

/// Applies a Session Record's cookies/headers onto a `reqwest::ClientBuilder`
/// default-header set plus a `reqwest::cookie::Jar`, ready for the HTTP
/// Client Facade to attach to an outgoing request.
pub fn apply_session_to_headers(record: &SessionRecord, headers: &mut HashMap<String, String>) {
    for (key, value) in &record.headers {
        headers.insert(key.clone(), value.clone());
    }
}

/// Validates a Session Record before it is trusted by the Remote Service
/// Proxy or handed to a Remote Service Server (spec.md §3 invariant).
pub fn validate_session_record(record: &SessionRecord, now_secs: i64) -> SessionResult<()> {
    if !record.is_valid() {
        return Err(SessionError::Invalid);
    }
    if record.is_expired_at(now_secs) {
        return Err(SessionError::Expired { cached_at: record.cached_at });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_proxy_authorization_case_insensitively() {
        let mut headers = HashMap::new();
        headers.insert("Proxy-Authorization".to_string(), "Basic xyz".to_string());
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        let filtered = filter_excluded_headers(headers);
        assert!(!filtered.contains_key("Proxy-Authorization"));
        assert_eq!(filtered.get("Authorization").unwrap(), "Bearer abc");
    }

    #[test]
    fn validate_rejects_expired_record() {
        let record = SessionRecord::new("atvp", "default", 0);
        let err = validate_session_record(&record, crate::models::SESSION_EXPIRY_SECS);
        assert!(matches!(err, Err(SessionError::Invalid)));
    }

    #[test]
    fn validate_accepts_fresh_record_with_cookie() {
        let mut record = SessionRecord::new("atvp", "default", 1000);
        record.cookies.insert(
            "sid".to_string(),
            Cookie { value: "a".into(), domain: String::new(), path: "/".into(), secure: false, expires: None },
        );
        assert!(validate_session_record(&record, 1500).is_ok());
    }
}
