use crate::types::{FeedError, FetchConfig, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// One GET against a platform API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportRequest {
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub bearer_token: Option<String>,
}

impl TransportRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Endpoint with the query string applied.
    pub fn url(&self) -> Result<Url> {
        Ok(Url::parse_with_params(&self.endpoint, &self.query)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The only thing sources need from an HTTP client: a status code and a
/// parsed body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &TransportRequest) -> Result<TransportResponse>;
}

pub struct HttpTransport {
    client: Client,
    config: FetchConfig,
}

impl HttpTransport {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FeedError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn send(&self, url: &Url, bearer_token: Option<&str>) -> Result<Response> {
        let mut request = self.client.get(url.clone());

        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }

        // reqwest renders the full URL, query credentials included.
        request.send().await.map_err(|e| FeedError::Http(e.without_url()))
    }

    async fn read_body(&self, response: Response) -> Result<Value> {
        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_payload_size_mb {
                return Err(FeedError::ResponseFormat(format!(
                    "Payload too large: {}MB",
                    size_mb
                )));
            }
        }

        let text = response
            .text()
            .await
            .map_err(|e| FeedError::Http(e.without_url()))?;
        serde_json::from_str(&text)
            .map_err(|e| FeedError::ResponseFormat(format!("Body is not valid JSON: {}", e)))
    }

    fn retry_schedule(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &TransportRequest) -> Result<TransportResponse> {
        let url = request.url()?;
        let started = Instant::now();
        let mut backoff = self.retry_schedule();
        let mut last_error = None;

        debug!("GET {}", request.endpoint);

        for attempt in 0..=self.config.max_retries {
            match self.send(&url, request.bearer_token.as_deref()).await {
                Ok(response) => {
                    let status = response.status();

                    if is_retryable(status) && attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!(
                                "Attempt {} for {} returned HTTP {}, retrying in {:?}",
                                attempt + 1,
                                request.endpoint,
                                status,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }

                    // Error statuses still carry a body the platform uses to
                    // explain the failure, so it is returned rather than raised.
                    let body = self.read_body(response).await?;
                    info!(
                        "GET {} -> HTTP {} in {}ms",
                        request.endpoint,
                        status.as_u16(),
                        started.elapsed().as_millis()
                    );
                    return Ok(TransportResponse {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    last_error = Some(e);

                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!(
                                "Attempt {} failed for {}, retrying in {:?}",
                                attempt + 1,
                                request.endpoint,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        Err(FeedError::Transport(format!(
            "GET {} failed after {} attempts: {}",
            request.endpoint,
            self.config.max_retries + 1,
            message
        )))
    }
}
