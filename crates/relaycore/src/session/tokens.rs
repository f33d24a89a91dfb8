//! Authentication-token extraction helpers used when rehydrating a Session
//! Record into outgoing request headers (spec.md §4.2 supplement).

use std::collections::HashMap;

const TOKEN_HEADERS: &[(&str, &str)] =
    &[("x_api_key", "X-API-Key"), ("api_key", "Api-Key"), ("x_auth_token", "X-Auth-Token")];

/// Pulls Bearer/API-key style tokens out of a header map so they can be
/// cached or logged independently of the full Session Record.
pub fn extract_session_tokens(headers: &HashMap<String, String>) -> HashMap<String, String> {
    let mut tokens = HashMap::new();

    if let Some(auth) = find_header(headers, "Authorization") {
        tokens.insert("authorization".to_string(), auth.clone());
    }
    for (token_key, header_name) in TOKEN_HEADERS {
        if let Some(value) = find_header(headers, header_name) {
            tokens.insert((*token_key).to_string(), value.clone());
        }
    }
    tokens
}

/// Inverse of [`extract_session_tokens`]: writes tokens back onto a header map.
pub fn apply_session_tokens(tokens: &HashMap<String, String>, headers: &mut HashMap<String, String>) {
    if let Some(auth) = tokens.get("authorization") {
        headers.insert("Authorization".to_string(), auth.clone());
    }
    for (token_key, header_name) in TOKEN_HEADERS {
        if let Some(value) = tokens.get(*token_key) {
            headers.insert((*header_name).to_string(), value.clone());
        }
    }
}

fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a String> {
    headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_authorization_and_api_key() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        headers.insert("X-API-Key".to_string(), "key123".to_string());

        let tokens = extract_session_tokens(&headers);
        assert_eq!(tokens.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(tokens.get("x_api_key").unwrap(), "key123");
    }

    #[test]
    fn round_trips_through_apply() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        let tokens = extract_session_tokens(&headers);

        let mut target = HashMap::new();
        apply_session_tokens(&tokens, &mut target);
        assert_eq!(target.get("Authorization").unwrap(), "Bearer abc");
    }
}
