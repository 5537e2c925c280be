use menhir_host::{HttpError, ModelError, RngError, StorageError};
use thiserror::Error;

/// Errors raised by node construction, initialization, or execution.
#[derive(Debug, Error)]
pub enum NodeError {
  #[error("missing required input '{input}'")]
  MissingInput { input: String },

  #[error("invalid input '{input}': {message}")]
  InvalidInput { input: String, message: String },

  #[error("collaborator unavailable: {message}")]
  Unavailable { message: String },

  #[error("{message}")]
  Failed { message: String },
}

impl NodeError {
  pub fn missing_input(input: impl Into<String>) -> Self {
    Self::MissingInput {
      input: input.into(),
    }
  }

  pub fn invalid_input(input: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidInput {
      input: input.into(),
      message: message.into(),
    }
  }

  pub fn unavailable(message: impl Into<String>) -> Self {
    Self::Unavailable {
      message: message.into(),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }
}

impl From<ModelError> for NodeError {
  fn from(e: ModelError) -> Self {
    match e {
      ModelError::NotLoaded => NodeError::unavailable(e.to_string()),
      ModelError::Generation { .. } => NodeError::failed(e.to_string()),
    }
  }
}

impl From<StorageError> for NodeError {
  fn from(e: StorageError) -> Self {
    match e {
      StorageError::Unavailable { .. } => NodeError::unavailable(e.to_string()),
      StorageError::Operation { .. } => NodeError::failed(e.to_string()),
    }
  }
}

impl From<RngError> for NodeError {
  fn from(e: RngError) -> Self {
    NodeError::failed(e.to_string())
  }
}

impl From<HttpError> for NodeError {
  fn from(e: HttpError) -> Self {
    NodeError::failed(e.to_string())
  }
}
