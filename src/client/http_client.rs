//! HTTP retrieval of `details.xml`
//!
//! OWServer hardware only speaks plain HTTP without authentication. One GET
//! per server per cycle, bounded by the configured timeout, no retries.

use crate::client::DetailsFetcher;
use crate::error::{OwServerError, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path of the details document on every server
pub const DETAILS_PATH: &str = "details.xml";

/// HTTP client for OWServer hardware
#[derive(Debug, Clone)]
pub struct OwServerHttpClient {
    client: Client,
    timeout: Duration,
}

impl OwServerHttpClient {
    /// Create a new HTTP client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(format!("owserver-poller/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OwServerError::fetch(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the details URL for a server address (`ip` or `ip:port`)
    pub fn details_url(server: &str) -> Result<Url> {
        let server = server.trim();
        if server.is_empty() {
            return Err(OwServerError::invalid_input("empty server address"));
        }
        Url::parse(&format!("http://{server}/{DETAILS_PATH}"))
            .map_err(|e| OwServerError::invalid_input(format!("Invalid server address '{server}': {e}")))
    }
}

#[async_trait]
impl DetailsFetcher for OwServerHttpClient {
    async fn fetch_raw(&self, server: &str) -> Result<String> {
        let url = Self::details_url(server)?;
        debug!("HTTP GET {url}");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                OwServerError::timeout(format!("{url} did not answer within {:?}", self.timeout))
            } else if e.is_connect() {
                OwServerError::fetch(format!("Cannot connect to {url}: {e}"))
            } else {
                OwServerError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OwServerError::fetch(format!("HTTP error {status} from {url}")));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                OwServerError::timeout(format!("reading body from {url}: {e}"))
            } else {
                OwServerError::Http(e)
            }
        })?;
        debug!("details.xml retrieved from {url} ({} bytes)", body.len());
        Ok(body)
    }
}
