//! HTTP client for fetching remote assets.
//!
//! This module provides a wrapper around `reqwest` with:
//! - Streaming downloads that report progress to a [`ProgressSink`]
//! - Configurable timeouts, proxy and User-Agent
//! - An opt-in retry policy with exponential backoff (off by default, a failed
//!   transfer is reported to the caller as-is)
//! - Cooperative cancellation through a `CancellationToken`
//!
//! # Examples
//!
//! ```no_run
//! use mird_fetch::http::{HttpClient, HttpClientConfig};
//! use mird_fetch::progress::NoProgress;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpClientConfig::new().with_timeout(Duration::from_secs(600));
//! let client = HttpClient::with_config(config)?;
//!
//! client
//!     .download("https://example.com/audio.zip", "/tmp/audio.zip".as_ref(), "audio", &NoProgress, None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressSink;

const DEFAULT_USER_AGENT: &str = concat!("mird-fetch/", env!("CARGO_PKG_VERSION"));
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 0;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Max retries exceeded for {url}")]
    MaxRetries { url: String },

    #[error("Transfer cancelled: {url}")]
    Cancelled { url: String },
}

pub struct HttpClient {
    client: Client,
    user_agent: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        // Bytes on disk must match the remote file for checksumming
        let mut builder = Client::builder()
            .no_gzip()
            .read_timeout(config.read_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            user_agent: config.user_agent,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        })
    }

    /// Perform GET request, retrying only as far as the configured policy allows
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(HttpError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    } else {
                        // Client errors are never retried
                        return Err(HttpError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                }
                Err(e) => {
                    last_error = Some(HttpError::Request(e));
                }
            }

            if attempt < self.max_retries {
                let delay = backoff_delay(self.retry_delay, attempt);
                log::debug!("Retrying {} in {:?} (attempt {})", url, delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Err(HttpError::MaxRetries {
                url: url.to_string(),
            }),
        }
    }

    /// Stream `url` into `dest`, reporting progress under `name`.
    ///
    /// Returns the number of bytes written. The destination's parent directory
    /// must already exist. A partially written file is left in place on error.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        name: &str,
        progress: &dyn ProgressSink,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64, HttpError> {
        let response = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(HttpError::Cancelled { url: url.to_string() }),
                response = self.get(url) => response?,
            },
            None => self.get(url).await?,
        };

        let total_size = response.content_length();
        progress.start(name, total_size);

        let result = self
            .stream_to_file(response, url, dest, name, total_size, progress, cancel)
            .await;
        progress.finish(name);
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_to_file(
        &self,
        response: Response,
        url: &str,
        dest: &Path,
        name: &str,
        total_size: Option<u64>,
        progress: &dyn ProgressSink,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64, HttpError> {
        let mut file = File::create(dest).await?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(HttpError::Cancelled { url: url.to_string() }),
                    next = stream.next() => next,
                },
                None => stream.next().await,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress.advance(name, downloaded, total_size);
        }

        file.flush().await?;
        // Total is known once the stream is exhausted
        progress.advance(name, downloaded, Some(total_size.unwrap_or(downloaded)));

        Ok(downloaded)
    }

    /// Get the configured user agent
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Get the maximum number of retries
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Delay before retry number `attempt + 1`, doubling each time
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Limit on a whole request including the body; unset by default
    pub timeout: Option<Duration>,
    /// Limit on the gap between two reads of the response
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}
