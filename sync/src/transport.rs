//! Network transport seam.
//!
//! The coordinator only sees the [`Transport`] trait: a single HTTP-like
//! request primitive returning a status code and a JSON body, or a
//! transport-level error. Production uses [`HttpTransport`] over reqwest;
//! tests substitute a mock.

use async_trait::async_trait;
use satchel_engine::HttpMethod;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A single remote operation, already resolved to method + concrete path.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

/// Status code and parsed JSON body of a completed request.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures below the HTTP layer. All of these are retryable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// The request primitive the coordinator drains against.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Supplies the bearer credential attached to every request.
///
/// Owned by the external auth subsystem. On a 401/403 the coordinator calls
/// [`refresh`](Self::refresh); the failed attempt is retried only if the
/// refresh reports success.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current bearer token, if any.
    async fn token(&self) -> Option<String>;

    /// Try to obtain fresh credentials. Returns true if a retry is worthwhile.
    async fn refresh(&self) -> bool;
}

/// A fixed token that can never be refreshed.
#[derive(Debug, Clone, Default)]
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// No credential at all; requests go out unauthenticated.
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        self.token.clone()
    }

    async fn refresh(&self) -> bool {
        false
    }
}

/// Production transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpTransport {
    /// Build a transport with a per-request timeout baked into the client.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            tokens,
        }
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );

        let mut builder = self.client.request(Self::method(request.method), &url);
        if let Some(token) = self.tokens.token().await {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else if e.is_connect() || e.is_request() {
                TransportError::Unreachable(e.to_string())
            } else {
                TransportError::Protocol(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        // Empty bodies (204, DELETE responses) parse as null.
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        Ok(Response { status, body })
    }
}
