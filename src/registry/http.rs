use crate::error::{ModpilotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use std::time::Duration;

const USER_AGENT: &str = concat!("modpilot/", env!("CARGO_PKG_VERSION"));
const MAX_IDLE_PER_HOST: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, url)
    }

    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(HttpMethod::Post, url)
            .header("Content-Type", "application/json")
            .with_body(body)
    }

    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// A completed exchange. Non-2xx statuses are carried here, not raised.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network seam shared by the registry clients, the planner's size probe,
/// the downloader and the webhook notifier.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Fails only when no status was received at all.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport backed by one pooled reqwest client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build()
            .map_err(|e| ModpilotError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Head => self.client.head(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!(method = ?request.method, url = %request.url, "sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| ModpilotError::Network(format!("{}: {e}", request.url)))?;

        let status = response.status().as_u16();
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        let body = if request.method == HttpMethod::Head {
            Vec::new()
        } else {
            response
                .bytes()
                .await
                .map_err(|e| ModpilotError::Network(format!("{}: {e}", request.url)))?
                .to_vec()
        };

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}
