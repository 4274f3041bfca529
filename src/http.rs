use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// JSON-over-HTTP fetcher used by watched queries
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("qfetch/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }

  /// GET `url` and decode the body as JSON. Non-success statuses are errors.
  pub async fn get_json(&self, url: &Url) -> Result<Value> {
    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to request {}: {}", url, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(eyre!("Request to {} failed with status {}", url, status));
    }

    response
      .json::<Value>()
      .await
      .map_err(|e| eyre!("Failed to decode JSON from {}: {}", url, e))
  }
}
