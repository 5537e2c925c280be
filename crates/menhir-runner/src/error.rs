use menhir_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("workflow limit reached: {current} of {limit} workflows running")]
  RunningLimit { limit: usize, current: usize },

  #[error("workflow limit reached for caller '{caller}': {current} of {limit} running")]
  CallerLimit {
    caller: String,
    limit: usize,
    current: usize,
  },

  #[error(transparent)]
  Engine(#[from] EngineError),
}
