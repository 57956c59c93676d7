//! Upstream fetching with a hard timeout.
//!
//! Documents and block-lists are fetched once, without retries. A non-2xx
//! status is returned as is so the caller can propagate it.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

/// Longest upstream error body kept in [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Upstream returned HTTP {status}")]
    Status { status: u16, body: String },
    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),
    #[error("Upstream request failed: {0}")]
    Transport(String),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// URL after redirects
    pub url: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetch `url`, failing with [`FetchError::Timeout`] once `timeout` elapses.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<Fetched, FetchError> {
        match tokio::time::timeout(timeout, self.get(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }

    /// Fetch a text resource such as a block-list.
    pub async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let fetched = self.fetch(url, timeout).await?;
        Ok(String::from_utf8_lossy(&fetched.bytes).into_owned())
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<Fetched, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?;

        log::debug!("fetched {} ({} bytes)", final_url, bytes.len());

        Ok(Fetched {
            url: final_url,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
