//! Gate: a yes/no check on every RPC request before it reaches the core.

use axum::http::HeaderMap;
use std::sync::Arc;

/// Header carrying the credential on HTTP calls.
pub const AUTH_HEADER: &str = "x-authentication";
/// Query parameter carrying the credential on WebSocket upgrades.
pub const AUTH_QUERY: &str = "token";

pub trait Gate: Send + Sync + 'static {
    fn allow(&self, headers: &HeaderMap, query: Option<&str>) -> bool;
}

/// Lets everything through. Used when no secret is configured.
pub struct OpenGate;

impl Gate for OpenGate {
    fn allow(&self, _headers: &HeaderMap, _query: Option<&str>) -> bool {
        true
    }
}

/// Requires the configured shared secret in the header or query.
pub struct SecretGate {
    secret: String,
}

impl SecretGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Gate for SecretGate {
    fn allow(&self, headers: &HeaderMap, query: Option<&str>) -> bool {
        match credential(headers, query) {
            Some(token) => constant_time_eq(token.as_bytes(), self.secret.as_bytes()),
            None => false,
        }
    }
}

pub fn from_secret(secret: Option<String>) -> Arc<dyn Gate> {
    match secret.filter(|s| !s.is_empty()) {
        Some(s) => Arc::new(SecretGate::new(s)),
        None => Arc::new(OpenGate),
    }
}

fn credential(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(v) = headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(v.trim().to_string());
    }
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == AUTH_QUERY)
        .map(|(_, v)| v.into_owned())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn open_gate_allows_anything() {
        assert!(OpenGate.allow(&HeaderMap::new(), None));
    }

    #[test]
    fn secret_gate_checks_header() {
        let gate = SecretGate::new("s3cret");
        let mut headers = HeaderMap::new();
        assert!(!gate.allow(&headers, None));
        headers.insert(AUTH_HEADER, HeaderValue::from_static("wrong!"));
        assert!(!gate.allow(&headers, None));
        headers.insert(AUTH_HEADER, HeaderValue::from_static("s3cret"));
        assert!(gate.allow(&headers, None));
    }

    #[test]
    fn secret_gate_checks_query_token() {
        let gate = SecretGate::new("a b");
        let headers = HeaderMap::new();
        assert!(gate.allow(&headers, Some("x=1&token=a%20b")));
        assert!(!gate.allow(&headers, Some("token=ab")));
        assert!(!gate.allow(&headers, Some("x=1")));
    }

    #[test]
    fn empty_secret_disables_gate() {
        let gate = from_secret(Some(String::new()));
        assert!(gate.allow(&HeaderMap::new(), None));
        let gate = from_secret(Some("k".into()));
        assert!(!gate.allow(&HeaderMap::new(), None));
    }
}
