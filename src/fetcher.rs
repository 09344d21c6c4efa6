use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;

const USER_AGENT: &str = concat!("bulletin-loader/", env!("CARGO_PKG_VERSION"));

/// Body of a fetched URL. Listing pages are read as text, bulletin files as bytes.
#[derive(Debug, Clone)]
pub struct Page {
    body: Vec<u8>,
}

impl Page {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }
}

/// Capability to retrieve a URL. Shared by the collector and the downloader.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError>;
}

#[derive(Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_retries: usize,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            max_retries: 0,
        })
    }

    /// Retry transient failures with exponential backoff. Zero disables retries.
    pub fn with_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<Page, FetchError> {
        debug!("Sending HTTP request");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        debug!("Retrieved content, size: {} bytes", body.len());
        Ok(Page::new(body.to_vec()))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        if self.max_retries == 0 {
            return self.fetch_once(url).await;
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(10))
            .with_max_times(self.max_retries);

        (|| self.fetch_once(url))
            .retry(backoff)
            .when(|e: &FetchError| e.is_transient())
            .notify(|e: &FetchError, delay: Duration| {
                warn!(error = %e, delay_ms = delay.as_millis() as u64, "Retrying fetch");
            })
            .await
    }
}
