use chrono::{DateTime, Utc};
use menhir_workflow::WorkflowDoc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle of a queued execution job.
///
/// Transitions: QUEUED → RUNNING → {COMPLETED | FAILED}; CANCELLED is
/// reachable only from QUEUED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  Queued,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl JobStatus {
  /// Whether the job still counts against admission limits.
  pub fn is_pending(self) -> bool {
    matches!(self, JobStatus::Queued | JobStatus::Running)
  }

  pub fn is_terminal(self) -> bool {
    !self.is_pending()
  }
}

/// Caller-provided execution options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOptions {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_query: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub execution_id: Option<String>,
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub extra_data: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub variables: Map<String, Value>,
}

impl ExecutionOptions {
  /// Caller identity for admission limits: `user_id`, else `client_id`,
  /// else anonymous.
  pub fn caller_id(&self) -> &str {
    self
      .user_id
      .as_deref()
      .or(self.client_id.as_deref())
      .unwrap_or("anonymous")
  }

  /// Map the options bag into the engine's context variables.
  pub fn context_variables(&self) -> Map<String, Value> {
    let mut variables = Map::new();

    if let Some(client_id) = &self.client_id {
      variables.insert("user_id".to_string(), Value::String(client_id.clone()));
    }
    if let Some(user_id) = &self.user_id {
      variables.insert("user_id".to_string(), Value::String(user_id.clone()));
    }
    if let Some(user_query) = &self.user_query {
      variables.insert("user_query".to_string(), Value::String(user_query.clone()));
    }
    for (key, value) in &self.extra_data {
      variables.insert(key.clone(), value.clone());
    }
    for (key, value) in &self.variables {
      variables.insert(key.clone(), value.clone());
    }

    variables
  }
}

/// A durable execution job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionJob {
  pub id: String,
  pub workflow: WorkflowDoc,
  #[serde(default)]
  pub options: ExecutionOptions,
  pub status: JobStatus,
  #[serde(with = "chrono::serde::ts_microseconds")]
  pub created_at: DateTime<Utc>,
  #[serde(
    default,
    with = "chrono::serde::ts_microseconds_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(
    default,
    with = "chrono::serde::ts_microseconds_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Dense position within the waiting queue; 0 is next to run.
  #[serde(default)]
  pub position: usize,
}

/// The persisted queue document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
  pub jobs: Vec<ExecutionJob>,
  /// Unix timestamp (seconds) of the write.
  pub saved_at: i64,
}

/// Status view returned to callers polling a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
  pub job_id: String,
  pub status: JobStatus,
  /// Present only while the job is QUEUED.
  pub position: Option<usize>,
  pub queue_length: usize,
  #[serde(with = "chrono::serde::ts_microseconds")]
  pub created_at: DateTime<Utc>,
  #[serde(
    with = "chrono::serde::ts_microseconds_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(
    with = "chrono::serde::ts_microseconds_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub completed_at: Option<DateTime<Utc>>,
  pub has_result: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Overall queue status.
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
  pub queue_length: usize,
  pub current_job: Option<String>,
  pub is_processing: bool,
  pub total_jobs: usize,
}
