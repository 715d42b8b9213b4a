// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport used to retrieve metadata and target bytes.
//!
//! The updater only depends on the [`Fetcher`] trait. [`HttpFetcher`] is the
//! default implementation and talks plain HTTP(S) through `reqwest`. It
//! enforces the caller's length bound while streaming so an oversized or
//! endless response is cut off early.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, warn};

/// User agent sent when none is configured.
const DEFAULT_USER_AGENT: &str = concat!("tuf-updater/", env!("CARGO_PKG_VERSION"));
/// Per-request timeout applied by default.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Delay unit between retries; attempt `n` waits `n` units.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Errors returned by a [`Fetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server reported the resource as absent.
    #[error("resource {0} was not found")]
    NotFound(String),
    /// The server answered with an unexpected status.
    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },
    /// The body is larger than the caller allowed.
    #[error("response from {url} exceeds the maximum length of {max_length} bytes")]
    LengthExceeded { url: String, max_length: u64 },
    /// The URL could not be parsed.
    #[error("invalid url {0}")]
    InvalidUrl(String),
    /// Networking or TLS errors bubbled up from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether this error means "no such resource" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

/// Capability to download raw bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads `url`, failing if the body is longer than `max_length`.
    ///
    /// `prior_attempts` is the number of attempts the caller already made for
    /// this resource; implementations may use it to scale their backoff.
    async fn download_file(
        &self,
        url: &str,
        max_length: u64,
        prior_attempts: u32,
    ) -> Result<Vec<u8>, FetchError>;
}

/// Options for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherOptions {
    pub user_agent: String,
    pub timeout: Duration,
    /// Extra attempts made after a transport error. 404s and status errors
    /// are never retried.
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl Default for HttpFetcherOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// [`Fetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    retry_backoff: Duration,
}

impl HttpFetcher {
    pub fn new(options: HttpFetcherOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(options.user_agent)
            .timeout(options.timeout)
            .build()?;
        Ok(Self {
            client,
            retries: options.retries,
            retry_backoff: options.retry_backoff,
        })
    }

    async fn fetch_once(&self, url: &str, max_length: u64) -> Result<Vec<u8>, FetchError> {
        let parsed =
            Url::parse(url).map_err(|err| FetchError::InvalidUrl(format!("{url}: {err}")))?;
        let mut response = self.client.get(parsed).send().await?;
        match response.status() {
            status if status.is_success() => {}
            // Object stores commonly answer 403 for keys that do not exist.
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                return Err(FetchError::NotFound(url.to_string()))
            }
            status => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
        }

        let exceeded = || FetchError::LengthExceeded {
            url: url.to_string(),
            max_length,
        };
        if response.content_length().is_some_and(|len| len > max_length) {
            return Err(exceeded());
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > max_length {
                return Err(exceeded());
            }
            body.extend_from_slice(&chunk);
        }
        debug!(url, bytes = body.len(), "downloaded");
        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn download_file(
        &self,
        url: &str,
        max_length: u64,
        prior_attempts: u32,
    ) -> Result<Vec<u8>, FetchError> {
        let mut attempt = prior_attempts;
        let last_attempt = prior_attempts.saturating_add(self.retries);
        loop {
            match self.fetch_once(url, max_length).await {
                Err(FetchError::Transport(err)) if attempt < last_attempt => {
                    attempt += 1;
                    warn!(url, attempt, error = %err, "transport error, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}
