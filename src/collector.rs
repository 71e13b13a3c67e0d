use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

/// Default collector endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3030/analytics";

/// Outbound seam to the collector service. One call posts one encoded event
/// and returns the raw response body (only the registration path reads it).
#[async_trait]
pub trait Collector: Send + Sync {
    async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// HTTP collector client. No request timeout is set: a hung collector stalls
/// the dispatch worker, never the emitting caller.
pub struct HttpCollector {
    client: Client,
    endpoint: String,
}

impl HttpCollector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("collector rejected event: {}", response.status()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
