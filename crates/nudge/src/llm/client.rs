//! Client for an Ollama-compatible text generation server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "gpt-oss:20b";
pub const DEFAULT_TIMEOUT_SECS: u64 = 1500;
pub const MISSING_RESPONSE_TEXT: &str = "Unable to generate a response.";

#[derive(Error, Debug)]
pub enum GenerateError {
  #[error("API call error: {status}")]
  Status { status: u16 },

  #[error("API timeout: {message}")]
  Timeout { message: String },

  #[error("API connection failed: {message}")]
  Connection { message: String },

  #[error("API call failed: {message}")]
  Other { message: String },
}

impl GenerateError {
  pub fn other(message: impl Into<String>) -> Self {
    Self::Other { message: message.into() }
  }

  /// Descriptive text that stands in for a response the server never gave.
  pub fn placeholder(&self) -> String {
    self.to_string()
  }
}

impl From<reqwest::Error> for GenerateError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      GenerateError::Timeout { message: format!("the request took too long ({e})") }
    } else if e.is_connect() {
      GenerateError::Connection { message: format!("could not reach the generation server ({e})") }
    } else if let Some(status) = e.status() {
      GenerateError::Status { status: status.as_u16() }
    } else {
      GenerateError::other(e.to_string())
    }
  }
}

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// Base URL of the generation server (e.g., "http://127.0.0.1:11434")
  pub base_url: String,
  /// Request timeout in seconds
  pub timeout_secs: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self { base_url: DEFAULT_BASE_URL.to_string(), timeout_secs: DEFAULT_TIMEOUT_SECS }
  }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
  response: Option<String>,
}

pub struct OllamaClient {
  client: Client,
  config: ClientConfig,
}

impl OllamaClient {
  pub fn new(config: ClientConfig) -> Result<Self, GenerateError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| GenerateError::other(format!("failed to create HTTP client: {e}")))?;

    Ok(Self { client, config })
  }

  pub fn base_url(&self) -> &str {
    &self.config.base_url
  }
}

#[async_trait]
impl TextGenerator for OllamaClient {
  async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError> {
    let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));
    tracing::debug!(%url, model, prompt_len = prompt.len(), "requesting generation");

    let response = self
      .client
      .post(&url)
      .json(&GenerateRequest { model, prompt, stream: false })
      .send()
      .await?;

    if !response.status().is_success() {
      return Err(GenerateError::Status { status: response.status().as_u16() });
    }

    let body: GenerateResponse = response
      .json()
      .await
      .map_err(|e| GenerateError::other(format!("malformed response body: {e}")))?;

    Ok(body.response.unwrap_or_else(|| MISSING_RESPONSE_TEXT.to_string()))
  }
}
