use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
  #[error("queue is full ({limit} jobs waiting), try again later")]
  QueueFull { limit: usize },

  #[error("caller '{caller}' has {pending} pending jobs (max {limit}), wait for them to complete")]
  CallerLimit {
    caller: String,
    pending: usize,
    limit: usize,
  },
}
