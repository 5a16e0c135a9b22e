use async_trait::async_trait;
use reqwest::Url;

use super::FetchError;

/// Transport used to download one feed payload.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GETs `url` and returns the response body as text.
    async fn get_text(&self, url: &Url) -> Result<String, FetchError>;
}
