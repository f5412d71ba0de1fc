// packages/agent/src/interception/network.rs
//! Network interceptor
//!
//! Wraps the `network.send` entry point. Every outbound request gets a ULID
//! correlation id and an in-flight marker; when the transport settles the
//! exchange is finalized and appended to the network store. Requests and
//! responses reach the host unchanged unless a mock matches.

use crate::capture::{
    BodySnapshot, CaptureStore, Captured, NetworkExchange, RequestSnapshot, ResponseSnapshot,
};
use crate::interception::mock_table::{MockResponse, MockTable};
use crate::interception::Interceptor;
use crate::redirect::{Original, RedirectionTable};
use crate::registry::features::InterceptorId;
use crate::utils::errors::{AgentError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use ulid::Ulid;

/// Entry point used to originate outbound requests
pub const SEND_ENTRY_POINT: &str = "network.send";

/// Pending transport result
pub type TransportFuture = BoxFuture<'static, Result<NetworkResponse>>;

/// Outbound request handed to the transport
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl NetworkRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    fn snapshot(&self, limit: usize) -> RequestSnapshot {
        RequestSnapshot {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: BodySnapshot::capture(&self.body, limit),
        }
    }
}

/// Response delivered back to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl NetworkResponse {
    fn snapshot(&self, limit: usize) -> ResponseSnapshot {
        ResponseSnapshot {
            status: self.status,
            headers: self.headers.clone(),
            body: BodySnapshot::capture(&self.body, limit),
        }
    }
}

impl From<MockResponse> for NetworkResponse {
    fn from(mock: MockResponse) -> Self {
        Self {
            status: mock.status,
            headers: mock.headers,
            body: mock.body,
        }
    }
}

/// Plain HTTP transport used as the built-in original of `network.send`
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client }
    }

    /// Send a request over the real network
    pub fn send(&self, request: NetworkRequest) -> TransportFuture {
        let client = self.client.clone();
        Box::pin(async move {
            let mut builder = Request::builder()
                .method(request.method.as_str())
                .uri(request.url.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let outbound = builder.body(Full::new(request.body)).map_err(|e| {
                AgentError::TransportFailed(format!("Request build error: {}", e))
            })?;

            let response = client
                .request(outbound)
                .await
                .map_err(|e| AgentError::TransportFailed(format!("Request failed: {}", e)))?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| AgentError::TransportFailed(format!("Response body error: {}", e)))?
                .to_bytes();

            let headers = parts
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            Ok(NetworkResponse {
                status: parts.status.as_u16(),
                headers,
                body,
            })
        })
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Request that left the host and has not settled yet
#[derive(Debug, Clone)]
pub struct InFlight {
    pub method: String,
    pub url: String,
    pub started_at: DateTime<Utc>,
}

/// Error recorded for an exchange whose future was dropped before settling
pub const CANCELLED: &str = "cancelled";

struct NetworkState {
    store: Arc<CaptureStore<NetworkExchange>>,
    mocks: MockTable,
    in_flight: DashMap<String, InFlight>,
    max_body_snapshot: usize,
}

impl NetworkState {
    async fn observe(
        &self,
        original: Original<NetworkRequest, TransportFuture>,
        request: NetworkRequest,
    ) -> Result<NetworkResponse> {
        let exchange = PendingExchange::start(self, &request);
        debug!(
            "Intercepted request {}: {} {}",
            exchange.correlation_id, request.method, request.url
        );

        let (result, mocked) = match self.mocks.lookup(&request.url) {
            Some(mock) => (Ok(NetworkResponse::from(mock)), true),
            None => (original.call(request).await, false),
        };

        match &result {
            Ok(response) => {
                exchange.finish(Some(response.snapshot(self.max_body_snapshot)), None, mocked);
            }
            Err(e) => {
                warn!("Request {} failed: {}", exchange.correlation_id, e);
                exchange.finish(None, Some(e.to_string()), mocked);
            }
        }

        result
    }
}

/// An exchange between leaving the host and settling.
///
/// Finalized exactly once: by `finish`, or on drop when the host abandons
/// the request future (timeout, `select!`).
struct PendingExchange<'a> {
    state: &'a NetworkState,
    correlation_id: String,
    request: Option<RequestSnapshot>,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl<'a> PendingExchange<'a> {
    fn start(state: &'a NetworkState, request: &NetworkRequest) -> Self {
        let correlation_id = Ulid::new().to_string();
        let started_at = Utc::now();
        state.in_flight.insert(
            correlation_id.clone(),
            InFlight {
                method: request.method.clone(),
                url: request.url.clone(),
                started_at,
            },
        );

        Self {
            state,
            correlation_id,
            request: Some(request.snapshot(state.max_body_snapshot)),
            started_at,
            start: Instant::now(),
        }
    }

    fn finish(mut self, response: Option<ResponseSnapshot>, error: Option<String>, mocked: bool) {
        self.record(response, error, mocked);
    }

    fn record(&mut self, response: Option<ResponseSnapshot>, error: Option<String>, mocked: bool) {
        let Some(request) = self.request.take() else {
            return;
        };
        self.state.in_flight.remove(&self.correlation_id);

        self.state.store.append(NetworkExchange {
            correlation_id: self.correlation_id.clone(),
            request,
            response,
            error,
            started_at: self.started_at,
            duration_ms: self.start.elapsed().as_millis() as u64,
            mocked,
        });
    }
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        if self.request.is_some() {
            debug!("Request {} dropped before settling", self.correlation_id);
            self.record(None, Some(CANCELLED.to_string()), false);
        }
    }
}

/// Network interceptor
#[derive(Clone)]
pub struct NetworkInterceptor {
    state: Arc<NetworkState>,
}

impl NetworkInterceptor {
    pub fn new(store: Arc<CaptureStore<NetworkExchange>>, max_body_snapshot: usize) -> Self {
        Self {
            state: Arc::new(NetworkState {
                store,
                mocks: MockTable::new(),
                in_flight: DashMap::new(),
                max_body_snapshot,
            }),
        }
    }

    pub fn mocks(&self) -> &MockTable {
        &self.state.mocks
    }

    /// Serve `response` for requests matching `pattern`
    pub fn register_mock(&self, pattern: impl Into<String>, response: MockResponse) {
        self.state.mocks.register(pattern, response);
    }

    pub fn remove_mock(&self, pattern: &str) -> bool {
        self.state.mocks.remove(pattern)
    }

    pub fn clear_mocks(&self) {
        self.state.mocks.clear();
    }

    /// Requests currently waiting on the transport
    pub fn in_flight(&self) -> Vec<(String, InFlight)> {
        self.state
            .in_flight
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Record a synthetic GET exchange for `url` without touching the
    /// transport. A registered mock supplies the response if one matches.
    pub fn mock_request(&self, url: &str) -> Captured<NetworkExchange> {
        let request = NetworkRequest::get(url);
        let response = NetworkResponse::from(self.state.mocks.lookup(url).unwrap_or_default());
        let limit = self.state.max_body_snapshot;

        debug!("Recording synthetic exchange for {}", url);
        self.state.store.append(NetworkExchange {
            correlation_id: Ulid::new().to_string(),
            request: request.snapshot(limit),
            response: Some(response.snapshot(limit)),
            error: None,
            started_at: Utc::now(),
            duration_ms: 0,
            mocked: true,
        })
    }
}

impl Interceptor for NetworkInterceptor {
    fn id(&self) -> InterceptorId {
        InterceptorId::Network
    }

    fn enable(&self, table: &RedirectionTable) -> Result<bool> {
        let state = Arc::clone(&self.state);
        table.install(
            SEND_ENTRY_POINT,
            InterceptorId::Network.as_str(),
            move |original: &Original<NetworkRequest, TransportFuture>, request: NetworkRequest| {
                let state = Arc::clone(&state);
                let original = original.clone();
                Box::pin(async move { state.observe(original, request).await }) as TransportFuture
            },
        )
    }
}

/// Host-side handle for sending requests through the entry point
#[derive(Clone)]
pub struct NetworkClient {
    table: Arc<RedirectionTable>,
}

impl NetworkClient {
    pub fn new(table: Arc<RedirectionTable>) -> Self {
        Self { table }
    }

    pub async fn send(&self, request: NetworkRequest) -> Result<NetworkResponse> {
        self.table
            .call::<NetworkRequest, TransportFuture>(SEND_ENTRY_POINT, request)?
            .await
    }

    pub async fn get(&self, url: &str) -> Result<NetworkResponse> {
        self.send(NetworkRequest::get(url)).await
    }
}
