//! Generation model contract.
//!
//! One shared model instance serves the whole process; serialization of
//! access is the inference queue's concern, not the model's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One message of prior conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: String,
  pub content: String,
}

/// Request payload for a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
  pub query: String,
  pub system_prompt: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub conversation_history: Option<Vec<ChatMessage>>,
  #[serde(default = "default_enable_thinking")]
  pub enable_thinking: bool,
  #[serde(default = "default_max_tokens")]
  pub max_tokens: u32,
  #[serde(default = "default_temperature")]
  pub temperature: f64,
  #[serde(default = "default_top_p")]
  pub top_p: f64,
  #[serde(default = "default_top_k")]
  pub top_k: u32,
  #[serde(default = "default_repetition_penalty")]
  pub repetition_penalty: f64,
}

fn default_enable_thinking() -> bool {
  true
}

fn default_max_tokens() -> u32 {
  1024
}

fn default_temperature() -> f64 {
  0.6
}

fn default_top_p() -> f64 {
  0.95
}

fn default_top_k() -> u32 {
  20
}

fn default_repetition_penalty() -> f64 {
  1.2
}

impl GenerationRequest {
  /// A request with default generation parameters.
  pub fn new(query: impl Into<String>, system_prompt: impl Into<String>) -> Self {
    Self {
      query: query.into(),
      system_prompt: system_prompt.into(),
      conversation_history: None,
      enable_thinking: default_enable_thinking(),
      max_tokens: default_max_tokens(),
      temperature: default_temperature(),
      top_p: default_top_p(),
      top_k: default_top_k(),
      repetition_penalty: default_repetition_penalty(),
    }
  }
}

/// Response payload from a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
  pub response: String,
  #[serde(default)]
  pub thinking_content: String,
  pub model: String,
  #[serde(default)]
  pub input_tokens: u64,
  #[serde(default)]
  pub output_tokens: u64,
  #[serde(default)]
  pub generation_params: Map<String, Value>,
  #[serde(default)]
  pub source: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl GenerationResponse {
  /// An error-carrying response, used when generation itself failed but the
  /// caller still expects a response shape.
  pub fn from_error(model: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      response: String::new(),
      thinking_content: String::new(),
      model: model.into(),
      input_tokens: 0,
      output_tokens: 0,
      generation_params: Map::new(),
      source: "error".to_string(),
      error: Some(message.into()),
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
  #[error("model is not loaded")]
  NotLoaded,

  #[error("generation failed: {message}")]
  Generation { message: String },
}

/// The shared LLM.
///
/// Implementations are not expected to be reentrant; callers go through the
/// inference queue, which guarantees a single in-flight `generate`.
#[async_trait]
pub trait GenerationModel: Send + Sync {
  /// Run one generation to completion.
  async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ModelError>;

  /// Model name reported in responses.
  fn name(&self) -> &str;
}
