//! Manifest Fetcher
//!
//! Retrieves the update manifest from an ordered list of sources. Each source
//! is tried over two independent HTTP stacks before moving on; the first 2xx
//! JSON response wins.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::manifest::{Manifest, ManifestError};

/// Largest manifest body accepted, in bytes
pub const MAX_MANIFEST_BYTES: usize = 512_000;

/// Per-attempt timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(9_000);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid update URL: {0}")]
    InvalidUrl(String),
    #[error("Unable to reach update server: {0}")]
    NetworkUnreachable(String),
    #[error("Update server error ({0}).")]
    BadStatus(u16),
    #[error("Update manifest too large.")]
    PayloadTooLarge,
    #[error("Invalid update manifest JSON.")]
    InvalidJson,
    #[error("Update check timed out.")]
    Timeout,
    #[error("No update sources configured.")]
    NoSources,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::NetworkUnreachable(e.to_string())
        }
    }
}

/// One way of performing an HTTP GET for a JSON document
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// GET `url` and parse the body as JSON.
    ///
    /// Must fail on non-2xx statuses and on bodies over [`MAX_MANIFEST_BYTES`].
    async fn get_json(&self, url: &Url, timeout: Duration) -> Result<Value, FetchError>;
}

/// Append a chunk, failing once the body would exceed the manifest cap
fn push_capped(body: &mut Vec<u8>, chunk: &[u8]) -> Result<(), FetchError> {
    if body.len() + chunk.len() > MAX_MANIFEST_BYTES {
        return Err(FetchError::PayloadTooLarge);
    }
    body.extend_from_slice(chunk);
    Ok(())
}

fn parse_body(body: &[u8]) -> Result<Value, FetchError> {
    serde_json::from_slice(body).map_err(|_| FetchError::InvalidJson)
}

/// Async reqwest client using the system proxy configuration
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Self {
        let client = match reqwest::Client::builder().user_agent(user_agent).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default manifest client");
                reqwest::Client::default()
            }
        };
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get_json(&self, url: &Url, timeout: Duration) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }
        if response.content_length().unwrap_or(0) > MAX_MANIFEST_BYTES as u64 {
            return Err(FetchError::PayloadTooLarge);
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            push_capped(&mut body, &chunk?)?;
        }

        parse_body(&body)
    }
}

/// Blocking reqwest client with proxies disabled, run on the blocking pool.
///
/// Built per attempt so that no state is shared with [`HttpTransport`].
pub struct DirectTransport {
    user_agent: String,
}

impl DirectTransport {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
        }
    }
}

fn get_json_blocking(url: Url, user_agent: &str, timeout: Duration) -> Result<Value, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(user_agent)
        .no_proxy()
        .timeout(timeout)
        .build()?;

    let response = client.get(url).header(ACCEPT, "application/json").send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::BadStatus(status.as_u16()));
    }

    let mut body = Vec::new();
    response
        .take(MAX_MANIFEST_BYTES as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => FetchError::Timeout,
            _ => FetchError::NetworkUnreachable(e.to_string()),
        })?;
    if body.len() > MAX_MANIFEST_BYTES {
        return Err(FetchError::PayloadTooLarge);
    }

    parse_body(&body)
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn get_json(&self, url: &Url, timeout: Duration) -> Result<Value, FetchError> {
        let url = url.clone();
        let user_agent = self.user_agent.clone();
        tokio::task::spawn_blocking(move || get_json_blocking(url, &user_agent, timeout))
            .await
            .map_err(|e| FetchError::NetworkUnreachable(format!("transport task failed: {}", e)))?
    }
}

/// A JSON document together with the source URL that produced it
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub document: Value,
    pub source_url: Url,
}

impl FetchedManifest {
    pub fn manifest(&self) -> Result<Manifest, ManifestError> {
        Manifest::from_json(&self.document)
    }
}

/// Sequential, first-success-wins manifest retrieval
pub struct ManifestFetcher {
    transports: Vec<Arc<dyn Transport>>,
    timeout: Duration,
}

impl ManifestFetcher {
    /// Default transport chain: [`HttpTransport`] then [`DirectTransport`]
    pub fn new(user_agent: &str) -> Self {
        Self::with_transports(vec![
            Arc::new(HttpTransport::new(user_agent)),
            Arc::new(DirectTransport::new(user_agent)),
        ])
    }

    pub fn with_transports(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self {
            transports,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Try every source with every transport, in order.
    ///
    /// Individual failures are logged and skipped. When nothing succeeds the
    /// error of the last attempt is returned.
    pub async fn fetch<S: AsRef<str>>(&self, sources: &[S]) -> Result<FetchedManifest, FetchError> {
        let mut last_error = FetchError::NoSources;

        for source in sources {
            let source = source.as_ref().trim();
            let url = match Url::parse(source) {
                Ok(url) => url,
                Err(_) => {
                    tracing::warn!(source, "skipping malformed update source");
                    last_error = FetchError::InvalidUrl(source.to_string());
                    continue;
                }
            };

            for transport in &self.transports {
                tracing::debug!(%url, transport = transport.name(), "fetching update manifest");

                let attempt = tokio::time::timeout(self.timeout, transport.get_json(&url, self.timeout))
                    .await
                    .unwrap_or(Err(FetchError::Timeout));

                match attempt {
                    Ok(document) => {
                        tracing::info!(%url, transport = transport.name(), "update manifest retrieved");
                        return Ok(FetchedManifest {
                            document,
                            source_url: url,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(%url, transport = transport.name(), error = %e, "manifest attempt failed");
                        last_error = e;
                    }
                }
            }
        }

        Err(last_error)
    }
}
