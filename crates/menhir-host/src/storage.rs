//! Key-addressable storage contract.
//!
//! Three record families: per-user interactions, per-user activity log
//! entries (summaries and the like), and opaque named blobs (model
//! weights). Backend internals are a collaborator concern; the in-memory
//! implementation here backs tests and the CLI.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("storage backend unavailable: {message}")]
  Unavailable { message: String },

  #[error("storage operation failed: {message}")]
  Operation { message: String },
}

/// Storage operations available to nodes.
#[async_trait]
pub trait Storage: Send + Sync {
  /// Append one interaction record for a user.
  async fn append_interaction(&self, user_id: &str, interaction: Value)
  -> Result<(), StorageError>;

  /// Most recent interactions for a user, oldest first.
  async fn recent_interactions(
    &self,
    user_id: &str,
    limit: usize,
  ) -> Result<Vec<Value>, StorageError>;

  /// Append one activity log entry for a user.
  async fn append_activity(&self, user_id: &str, entry: Value) -> Result<(), StorageError>;

  /// Most recent activity entries for a user, oldest first.
  async fn recent_activity(&self, user_id: &str, limit: usize)
  -> Result<Vec<Value>, StorageError>;

  /// Store an opaque blob under a key, replacing any prior content.
  async fn put_blob(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;

  /// Fetch a blob by key.
  async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

#[derive(Default)]
struct MemoryState {
  interactions: HashMap<String, Vec<Value>>,
  activity: HashMap<String, Vec<Value>>,
  blobs: HashMap<String, Vec<u8>>,
}

/// In-memory storage.
#[derive(Default)]
pub struct MemoryStore {
  state: Mutex<MemoryState>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn tail(records: &[Value], limit: usize) -> Vec<Value> {
  let start = records.len().saturating_sub(limit);
  records[start..].to_vec()
}

#[async_trait]
impl Storage for MemoryStore {
  async fn append_interaction(
    &self,
    user_id: &str,
    interaction: Value,
  ) -> Result<(), StorageError> {
    let mut state = self.state.lock().expect("storage lock poisoned");
    state
      .interactions
      .entry(user_id.to_string())
      .or_default()
      .push(interaction);
    Ok(())
  }

  async fn recent_interactions(
    &self,
    user_id: &str,
    limit: usize,
  ) -> Result<Vec<Value>, StorageError> {
    let state = self.state.lock().expect("storage lock poisoned");
    Ok(
      state
        .interactions
        .get(user_id)
        .map(|records| tail(records, limit))
        .unwrap_or_default(),
    )
  }

  async fn append_activity(&self, user_id: &str, entry: Value) -> Result<(), StorageError> {
    let mut state = self.state.lock().expect("storage lock poisoned");
    state
      .activity
      .entry(user_id.to_string())
      .or_default()
      .push(entry);
    Ok(())
  }

  async fn recent_activity(
    &self,
    user_id: &str,
    limit: usize,
  ) -> Result<Vec<Value>, StorageError> {
    let state = self.state.lock().expect("storage lock poisoned");
    Ok(
      state
        .activity
        .get(user_id)
        .map(|records| tail(records, limit))
        .unwrap_or_default(),
    )
  }

  async fn put_blob(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
    let mut state = self.state.lock().expect("storage lock poisoned");
    state.blobs.insert(key.to_string(), data);
    Ok(())
  }

  async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
    let state = self.state.lock().expect("storage lock poisoned");
    Ok(state.blobs.get(key).cloned())
  }
}
