// packages/agent/src/interception/mock_table.rs
//! Canned responses for the network interceptor
//!
//! Patterns are matched in order: exact URL, exact host, then `*.suffix`
//! host wildcards.

use bytes::Bytes;
use hyper::Uri;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Response served instead of calling the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// JSON body with a matching content type
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string()).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::json(200, &serde_json::json!({}))
    }
}

/// Pattern → canned response mapping
#[derive(Default)]
pub struct MockTable {
    mocks: RwLock<HashMap<String, MockResponse>>,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mock for a URL, host, or `*.suffix` host pattern
    pub fn register(&self, pattern: impl Into<String>, response: MockResponse) {
        let pattern = pattern.into();
        info!("Adding mock: {} -> {}", pattern, response.status);
        self.mocks.write().insert(pattern, response);
    }

    /// Remove a mock; returns false if none was registered
    pub fn remove(&self, pattern: &str) -> bool {
        let removed = self.mocks.write().remove(pattern).is_some();
        if removed {
            info!("Removed mock for {}", pattern);
        }
        removed
    }

    pub fn clear(&self) {
        self.mocks.write().clear();
        info!("Cleared all mocks");
    }

    pub fn len(&self) -> usize {
        self.mocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mocks.read().is_empty()
    }

    /// Find the mock serving `url`
    pub fn lookup(&self, url: &str) -> Option<MockResponse> {
        let mocks = self.mocks.read();

        if let Some(response) = mocks.get(url) {
            debug!("Found exact mock for {}", url);
            return Some(response.clone());
        }

        let host = url.parse::<Uri>().ok()?.host()?.to_string();

        if let Some(response) = mocks.get(&host) {
            debug!("Found host mock for {}", host);
            return Some(response.clone());
        }

        // Wildcard match (e.g., *.example.com)
        let mut wildcards: Vec<(&String, &MockResponse)> = mocks
            .iter()
            .filter(|(pattern, _)| pattern.starts_with("*."))
            .collect();
        // Longest suffix wins
        wildcards.sort_by_key(|(pattern, _)| std::cmp::Reverse(pattern.len()));

        for (pattern, response) in wildcards {
            let suffix = &pattern[1..];
            if host.ends_with(suffix) {
                debug!("Found wildcard mock for {} using {}", host, pattern);
                return Some(response.clone());
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_url_beats_host() {
        let table = MockTable::new();
        table.register("api.example.com", MockResponse::new(200, "host"));
        table.register(
            "http://api.example.com/users",
            MockResponse::new(201, "url"),
        );

        let hit = table.lookup("http://api.example.com/users").unwrap();
        assert_eq!(hit.status, 201);

        let hit = table.lookup("http://api.example.com/orders").unwrap();
        assert_eq!(hit.body, Bytes::from("host"));
    }

    #[test]
    fn test_wildcard_match() {
        let table = MockTable::new();
        table.register("*.example.com", MockResponse::new(503, ""));
        table.register("*.eu.example.com", MockResponse::new(204, ""));

        assert_eq!(table.lookup("http://cdn.example.com/a").unwrap().status, 503);
        assert_eq!(table.lookup("http://x.eu.example.com/").unwrap().status, 204);
        // The bare domain is not covered by its own wildcard
        assert!(table.lookup("http://example.com/").is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let table = MockTable::new();
        table.register("a.test", MockResponse::default());
        table.register("b.test", MockResponse::default());

        assert!(table.remove("a.test"));
        assert!(!table.remove("a.test"));
        assert_eq!(table.len(), 1);

        table.clear();
        assert!(table.is_empty());
        assert!(table.lookup("not a url").is_none());
    }

    #[test]
    fn test_default_is_empty_json() {
        let response = MockResponse::default();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Bytes::from("{}"));
        assert_eq!(
            response.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
    }
}
