use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use kegsmith_common::config::Config;
use kegsmith_common::error::{KegError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use tracing::{debug, error};
use url::Url;

const USER_AGENT_STRING: &str = "kegsmith formula installer (Rust)";
const MAX_REDIRECTS: usize = 10;

/// Transport for raw artifact bytes. Verification happens on top of this.
pub trait ArtifactSource: Send + Sync {
    fn fetch_bytes(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Fetches `https://` URLs over HTTP and `file://` URLs from local disk.
#[derive(Debug, Clone)]
pub struct UrlSource {
    client: Client,
}

impl UrlSource {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.connect_timeout, config.fetch_timeout)?,
        })
    }
}

fn build_http_client(connect_timeout: Duration, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| KegError::Generic(format!("Failed to build HTTP client: {e}")))
}

fn transport_failure(url: &Url, e: &reqwest::Error) -> KegError {
    let reason = if e.is_timeout() {
        format!("timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    KegError::FetchFailure {
        url: url.to_string(),
        reason,
    }
}

impl ArtifactSource for UrlSource {
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| KegError::FetchFailure {
                    url: url.to_string(),
                    reason: "not a local file path".to_string(),
                })?;
                debug!("Reading local artifact {}", path.display());
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| KegError::FetchFailure {
                        url: url.to_string(),
                        reason: format!("cannot read {}: {e}", path.display()),
                    })
            }
            "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| transport_failure(url, &e))?;
                let status = response.status();
                debug!("Received HTTP status: {} for {}", status, url);
                if !status.is_success() {
                    error!("HTTP error {} for URL {}", status, url);
                    return Err(KegError::FetchFailure {
                        url: url.to_string(),
                        reason: format!("HTTP status {status}"),
                    });
                }

                let mut body = Vec::with_capacity(
                    response.content_length().unwrap_or(0).min(64 * 1024 * 1024) as usize,
                );
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| transport_failure(url, &e))?;
                    body.extend_from_slice(&chunk);
                }
                Ok(body)
            }
            other => Err(KegError::FetchFailure {
                url: url.to_string(),
                reason: format!("unsupported URL scheme '{other}'"),
            }),
        }
    }
}

/// Serves artifacts from memory, keyed by URL. Records every request.
#[derive(Debug, Default)]
pub struct MemorySource {
    artifacts: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.artifacts.insert(url.to_string(), bytes.into());
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ArtifactSource for MemorySource {
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        self.artifacts
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| KegError::FetchFailure {
                url: url.to_string(),
                reason: "HTTP status 404 Not Found".to_string(),
            })
    }
}
