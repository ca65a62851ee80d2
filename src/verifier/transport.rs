//! HTTP transport for the verifier
//!
//! Abstracts the HTTP client for testability. Provides:
//! - Transport trait: one request in, one response out, no retries
//! - HttpTransport: blocking reqwest client with a per-request timeout
//! - MockTransport: scripted in-process responder that records requests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RANGE};
use tracing::debug;

use super::credential::{Credential, API_KEY_HEADER};

/// HTTP method used by the verification steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A single outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub method: Method,
    pub url: String,
    /// Inclusive byte range for a `Range` header
    pub range: Option<(u64, u64)>,
    pub json_body: Option<serde_json::Value>,
    /// Attached only for steps that require authentication
    pub credential: Option<&'a Credential>,
}

impl<'a> HttpRequest<'a> {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            range: None,
            json_body: None,
            credential: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            range: None,
            json_body: Some(body),
            credential: None,
        }
    }

    pub fn with_range(mut self, start: u64, end_inclusive: u64) -> Self {
        self.range = Some((start, end_inclusive));
        self
    }

    pub fn with_credential(mut self, credential: &'a Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// A received response, whatever its status
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Lossy UTF-8 prefix of the body for diagnostics
    pub fn body_snippet(&self, max: usize) -> String {
        let end = self.body.len().min(max);
        String::from_utf8_lossy(&self.body[..end]).into_owned()
    }
}

/// Transport errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Transport trait for verifier HTTP calls
pub trait Transport: Send + Sync {
    /// Execute one request; non-success statuses are returned, not errors
    fn execute(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError>;
}

/// Blocking reqwest transport
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("repro-verify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Unreachable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Unreachable(err.without_url().to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        builder = builder.header(ACCEPT, "application/json, application/octet-stream");
        if let Some((start, end)) = request.range {
            builder = builder.header(RANGE, format!("bytes={}-{}", start, end));
        }
        if let Some(body) = &request.json_body {
            builder = builder.header(CONTENT_TYPE, "application/json").json(body);
        }
        if let Some(credential) = request.credential {
            builder = builder.header(API_KEY_HEADER, credential.expose());
        }

        debug!(
            method = request.method.as_str(),
            url = %request.url,
            authenticated = request.credential.is_some(),
            "sending request"
        );

        let start = Instant::now();
        let response = builder.send().map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| self.map_error(e))?.to_vec();
        let elapsed = start.elapsed();

        debug!(status, bytes = body.len(), elapsed_ms = elapsed.as_millis() as u64, "response");
        Ok(HttpResponse {
            status,
            body,
            elapsed,
        })
    }
}

/// Scripted reply for [`MockTransport`]
#[derive(Debug, Clone)]
pub enum MockReply {
    /// JSON body with the given status
    Json(u16, serde_json::Value),
    /// Raw text body with the given status
    Text(u16, String),
    /// Binary body; `Range` requests are answered with 206 and the slice
    Bytes(Vec<u8>),
    /// Simulated timeout
    Timeout,
    /// Simulated connection failure
    Unreachable,
}

/// What the mock saw for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub range: Option<(u64, u64)>,
    pub authenticated: bool,
    pub body: Option<serde_json::Value>,
}

/// Mock transport for testing - answers from a route table in-process
#[derive(Default)]
pub struct MockTransport {
    routes: HashMap<(Method, String), MockReply>,
    expected_key: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Path component of a URL, without query string
pub(crate) fn url_path(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| &url[i + 3..]).unwrap_or(url);
    let path = after_scheme.find('/').map(|i| &after_scheme[i..]).unwrap_or("/");
    path.split(['?', '#']).next().unwrap_or("/")
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reply for `method` + URL path
    pub fn route(mut self, method: Method, path: &str, reply: MockReply) -> Self {
        self.routes.insert((method, path.to_string()), reply);
        self
    }

    /// Answer 401 to any request whose credential differs from `key`
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.expected_key = Some(key.to_string());
        self
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Whether any request hit `path`
    pub fn was_called(&self, path: &str) -> bool {
        self.requests().iter().any(|r| r.path == path)
    }

    fn respond(reply: &MockReply, range: Option<(u64, u64)>) -> Result<HttpResponse, TransportError> {
        let elapsed = Duration::from_millis(1);
        let (status, body) = match reply {
            MockReply::Json(status, value) => (*status, value.to_string().into_bytes()),
            MockReply::Text(status, text) => (*status, text.clone().into_bytes()),
            MockReply::Bytes(bytes) => match range {
                Some((start, end)) => {
                    let start = (start as usize).min(bytes.len());
                    let end = (end as usize).saturating_add(1).min(bytes.len());
                    (206, bytes[start..end.max(start)].to_vec())
                }
                None => (200, bytes.clone()),
            },
            MockReply::Timeout => return Err(TransportError::Timeout(Duration::from_secs(20))),
            MockReply::Unreachable => {
                return Err(TransportError::Unreachable("connection refused".to_string()))
            }
        };
        Ok(HttpResponse {
            status,
            body,
            elapsed,
        })
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let path = url_path(&request.url).to_string();
        if let Ok(mut log) = self.requests.lock() {
            log.push(RecordedRequest {
                method: request.method,
                path: path.clone(),
                range: request.range,
                authenticated: request.credential.is_some(),
                body: request.json_body.clone(),
            });
        }

        if let (Some(expected), Some(credential)) = (&self.expected_key, request.credential) {
            if credential.expose() != expected {
                return Ok(HttpResponse {
                    status: 401,
                    body: br#"{"error":"invalid api key"}"#.to_vec(),
                    elapsed: Duration::from_millis(1),
                });
            }
        }

        match self.routes.get(&(request.method, path)) {
            Some(reply) => Self::respond(reply, request.range),
            None => Ok(HttpResponse {
                status: 404,
                body: br#"{"error":"not found"}"#.to_vec(),
                elapsed: Duration::from_millis(1),
            }),
        }
    }
}
