use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
  #[error("inference queue is full ({limit} requests pending), try again later")]
  QueueFull { limit: usize },

  #[error("inference request timed out after {timeout_s:.1}s")]
  Timeout { timeout_s: f64 },

  #[error("inference queue is not running")]
  NotRunning,
}
