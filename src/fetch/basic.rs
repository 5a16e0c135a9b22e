use std::time::Duration;

use super::FetchError;
use super::client::HttpClient;
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::CACHE_CONTROL;

/// [`HttpClient`] backed by a plain `reqwest::Client`. Every request asks
/// intermediaries not to serve a cached copy.
pub struct BasicClient {
    inner: reqwest::Client,
    timeout: Option<Duration>,
}

impl BasicClient {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
            timeout: None,
        }
    }

    /// Builds a client whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| FetchError::transport("<client>", e))?;

        Ok(Self {
            inner,
            timeout: Some(timeout),
        })
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .inner
            .get(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| self.classify(url, e))
    }
}

impl BasicClient {
    fn classify(&self, url: &Url, err: reqwest::Error) -> FetchError {
        match self.timeout {
            Some(timeout) if err.is_timeout() => FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            _ => FetchError::transport(url, err),
        }
    }
}
