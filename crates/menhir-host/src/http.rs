//! Best-effort outbound HTTP.
//!
//! Thin helpers over a shared `reqwest::Client`. Every call carries an
//! explicit timeout; network failures come back as descriptive errors that
//! nodes surface as node failures.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
  #[error("request to {url} failed: {message}")]
  Request { url: String, message: String },

  #[error("request to {url} returned status {status}")]
  Status { url: String, status: u16 },

  #[error("response from {url} was not valid JSON: {message}")]
  Decode { url: String, message: String },
}

/// POST a JSON body and decode a JSON response.
pub async fn post_json(
  client: &reqwest::Client,
  url: &str,
  body: &Value,
  timeout: Duration,
) -> Result<Value, HttpError> {
  debug!(url = %url, "http_post");

  let response = client
    .post(url)
    .timeout(timeout)
    .json(body)
    .send()
    .await
    .map_err(|e| HttpError::Request {
      url: url.to_string(),
      message: e.to_string(),
    })?;

  decode_json(url, response).await
}

/// GET a URL and decode a JSON response.
pub async fn get_json(
  client: &reqwest::Client,
  url: &str,
  timeout: Duration,
) -> Result<Value, HttpError> {
  debug!(url = %url, "http_get");

  let response = client
    .get(url)
    .timeout(timeout)
    .send()
    .await
    .map_err(|e| HttpError::Request {
      url: url.to_string(),
      message: e.to_string(),
    })?;

  decode_json(url, response).await
}

async fn decode_json(url: &str, response: reqwest::Response) -> Result<Value, HttpError> {
  let status = response.status();
  if !status.is_success() {
    return Err(HttpError::Status {
      url: url.to_string(),
      status: status.as_u16(),
    });
  }

  response.json().await.map_err(|e| HttpError::Decode {
    url: url.to_string(),
    message: e.to_string(),
  })
}
