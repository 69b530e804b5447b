use eyre::{
    Context as _,
    Result,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Shared client for every HTTP source of a run.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("multi-sampler/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build the HTTP client")
}

/// A JSON document fetched with one GET request per sample.
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl JsonEndpoint {
    pub fn new(client: reqwest::Client, url: Url, timeout: Duration) -> Self {
        Self { client, url, timeout }
    }

    /// Fetch and decode the document.
    ///
    /// Transport errors, timeouts, non-success statuses and bodies that do
    /// not decode as `T` are logged and yield `None`.
    pub async fn get<T: DeserializeOwned>(&self, source: &str) -> Option<T> {
        let response = match self.client.get(self.url.clone()).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                warn!(source, url = %self.url, timeout = ?self.timeout, "request timed out");
                return None;
            }
            Err(err) => {
                warn!(source, url = %self.url, "request failed: {err}");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(source, url = %self.url, %status, "unexpected response status");
            return None;
        }

        // The exchange-rate feed is served as javascript, so decode the text
        // instead of relying on the content type.
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(source, url = %self.url, "failed to read response body: {err}");
                return None;
            }
        };

        match serde_json::from_str(&body) {
            Ok(document) => Some(document),
            Err(err) => {
                warn!(source, url = %self.url, bytes = body.len(), "malformed payload: {err}");
                None
            }
        }
    }
}
