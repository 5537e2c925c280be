//! The execution queue.
//!
//! In-memory state lives under a single mutex; persistence happens under
//! that mutex so the on-disk document never diverges from memory. The
//! worker is one cooperative task that drains the FIFO in enqueue order.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use menhir_engine::{ExecutionEngine, GraphExecutionResult};
use menhir_workflow::WorkflowDoc;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::job::{
  ExecutionJob, ExecutionOptions, JobStatus, JobStatusView, QueueDocument, QueueInfo,
};

const PERSISTENCE_FILE: &str = "execution_queue.json";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
  /// Directory holding the persistence document.
  pub data_dir: PathBuf,
  /// Maximum jobs waiting in the queue.
  pub max_queue_size: usize,
  /// Maximum QUEUED + RUNNING jobs per caller.
  pub max_jobs_per_user: usize,
  /// Terminal jobs retained in the persisted document.
  pub max_completed_retained: usize,
}

impl QueueConfig {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self {
      data_dir: data_dir.into(),
      max_queue_size: 20,
      max_jobs_per_user: 3,
      max_completed_retained: 100,
    }
  }
}

/// Factory producing an engine for each job execution.
pub type EngineFactory = Arc<dyn Fn() -> Result<ExecutionEngine, String> + Send + Sync>;

struct QueueState {
  /// All tracked jobs by id.
  jobs: HashMap<String, ExecutionJob>,
  /// Waiting jobs, head first.
  fifo: VecDeque<String>,
  /// Job currently being executed, if any.
  current: Option<String>,
}

impl QueueState {
  fn update_positions(&mut self) {
    for (position, id) in self.fifo.iter().enumerate() {
      if let Some(job) = self.jobs.get_mut(id) {
        job.position = position;
      }
    }
  }
}

struct QueueInner {
  config: QueueConfig,
  path: PathBuf,
  engine_factory: EngineFactory,
  state: Mutex<QueueState>,
  cancel: CancellationToken,
  worker: Mutex<Option<JoinHandle<()>>>,
}

/// Durable single-worker execution queue.
#[derive(Clone)]
pub struct ExecutionQueue {
  inner: Arc<QueueInner>,
}

impl ExecutionQueue {
  /// Open (or create) the queue, recovering persisted state.
  ///
  /// Jobs that were RUNNING at shutdown are demoted to QUEUED; waiting
  /// jobs re-enter the FIFO in `created_at` order.
  pub fn open(config: QueueConfig, engine_factory: EngineFactory) -> std::io::Result<Self> {
    std::fs::create_dir_all(&config.data_dir)?;
    let path = config.data_dir.join(PERSISTENCE_FILE);
    let state = load_state(&path);

    Ok(Self {
      inner: Arc::new(QueueInner {
        config,
        path,
        engine_factory,
        state: Mutex::new(state),
        cancel: CancellationToken::new(),
        worker: Mutex::new(None),
      }),
    })
  }

  /// Add a workflow execution to the queue.
  pub fn enqueue(
    &self,
    workflow: WorkflowDoc,
    options: ExecutionOptions,
  ) -> Result<ExecutionJob, QueueError> {
    let mut state = self.lock_state();

    if state.fifo.len() >= self.inner.config.max_queue_size {
      return Err(QueueError::QueueFull {
        limit: self.inner.config.max_queue_size,
      });
    }

    let caller = options.caller_id().to_string();
    let pending = state
      .jobs
      .values()
      .filter(|job| job.status.is_pending() && job.options.caller_id() == caller)
      .count();
    if pending >= self.inner.config.max_jobs_per_user {
      return Err(QueueError::CallerLimit {
        caller,
        pending,
        limit: self.inner.config.max_jobs_per_user,
      });
    }

    let job = ExecutionJob {
      id: uuid::Uuid::new_v4().to_string(),
      workflow,
      options,
      status: JobStatus::Queued,
      created_at: Utc::now(),
      started_at: None,
      completed_at: None,
      result: None,
      error: None,
      position: state.fifo.len(),
    };

    state.fifo.push_back(job.id.clone());
    state.jobs.insert(job.id.clone(), job.clone());
    state.update_positions();
    self.persist(&state);

    info!(
      job_id = %job.id,
      position = job.position,
      caller = %job.options.caller_id(),
      "job_enqueued"
    );
    Ok(job)
  }

  /// Get a job record by id.
  pub fn get_job(&self, job_id: &str) -> Option<ExecutionJob> {
    self.lock_state().jobs.get(job_id).cloned()
  }

  /// Job status with queue position.
  pub fn get_status(&self, job_id: &str) -> Option<JobStatusView> {
    let state = self.lock_state();
    let job = state.jobs.get(job_id)?;
    Some(JobStatusView {
      job_id: job.id.clone(),
      status: job.status,
      position: (job.status == JobStatus::Queued).then_some(job.position),
      queue_length: state.fifo.len(),
      created_at: job.created_at,
      started_at: job.started_at,
      completed_at: job.completed_at,
      has_result: job.result.is_some(),
      error: job.error.clone(),
    })
  }

  /// Job result: the stored result for COMPLETED, `{error}` for FAILED,
  /// nothing otherwise.
  pub fn get_result(&self, job_id: &str) -> Option<Value> {
    let state = self.lock_state();
    let job = state.jobs.get(job_id)?;
    match job.status {
      JobStatus::Completed => job.result.clone(),
      JobStatus::Failed => Some(json!({ "error": job.error })),
      _ => None,
    }
  }

  /// Cancel a QUEUED job. RUNNING jobs are never cancelled.
  pub fn cancel(&self, job_id: &str) -> bool {
    let mut state = self.lock_state();

    let Some(job) = state.jobs.get_mut(job_id) else {
      return false;
    };
    if job.status != JobStatus::Queued {
      return false;
    }

    job.status = JobStatus::Cancelled;
    job.completed_at = Some(Utc::now());
    state.fifo.retain(|id| id != job_id);
    state.update_positions();
    self.persist(&state);

    info!(job_id = %job_id, "job_cancelled");
    true
  }

  /// Overall queue status.
  pub fn queue_info(&self) -> QueueInfo {
    let state = self.lock_state();
    QueueInfo {
      queue_length: state.fifo.len(),
      current_job: state.current.clone(),
      is_processing: state.current.is_some(),
      total_jobs: state.jobs.len(),
    }
  }

  /// Number of waiting jobs.
  pub fn queue_length(&self) -> usize {
    self.lock_state().fifo.len()
  }

  /// Number of tracked jobs.
  pub fn total_jobs(&self) -> usize {
    self.lock_state().jobs.len()
  }

  /// Start the background worker.
  pub fn start_worker(&self) {
    let mut worker = self.inner.worker.lock().expect("worker lock poisoned");
    if worker.as_ref().is_some_and(|h| !h.is_finished()) {
      return;
    }
    let inner = self.inner.clone();
    let cancel = self.inner.cancel.clone();
    *worker = Some(tokio::spawn(worker_loop(inner, cancel)));
    info!("queue_worker_started");
  }

  /// Stop the background worker. The in-flight job, if any, completes.
  pub async fn stop_worker(&self) {
    self.inner.cancel.cancel();
    let handle = self.inner.worker.lock().expect("worker lock poisoned").take();
    if let Some(handle) = handle {
      let _ = handle.await;
    }
    info!("queue_worker_stopped");
  }

  fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
    self.inner.state.lock().expect("queue lock poisoned")
  }

  fn persist(&self, state: &QueueState) {
    persist_state(&self.inner.config, &self.inner.path, state);
  }
}

/// Single worker loop: dequeue, execute, record, repeat.
async fn worker_loop(inner: Arc<QueueInner>, cancel: CancellationToken) {
  loop {
    if cancel.is_cancelled() {
      break;
    }

    let next = {
      let mut state = inner.state.lock().expect("queue lock poisoned");
      match state.fifo.pop_front() {
        Some(id) => {
          let snapshot = state.jobs.get_mut(&id).map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.clone()
          });
          if snapshot.is_some() {
            state.current = Some(id);
            state.update_positions();
            persist_state(&inner.config, &inner.path, &state);
          }
          snapshot
        }
        None => None,
      }
    };

    let Some(job) = next else {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
      }
      continue;
    };

    info!(job_id = %job.id, "job_started");
    let outcome = execute_job(&inner, &job).await;

    {
      let mut state = inner.state.lock().expect("queue lock poisoned");
      if let Some(record) = state.jobs.get_mut(&job.id) {
        record.completed_at = Some(Utc::now());
        match &outcome {
          Ok(result) => {
            record.status = JobStatus::Completed;
            record.result = Some(result.clone());
          }
          Err(message) => {
            record.status = JobStatus::Failed;
            record.error = Some(message.clone());
          }
        }
      }
      state.current = None;
      persist_state(&inner.config, &inner.path, &state);
    }

    match outcome {
      Ok(_) => info!(job_id = %job.id, "job_completed"),
      Err(message) => error!(job_id = %job.id, error = %message, "job_failed"),
    }
  }
}

/// Run one job through a fresh engine.
///
/// Engine-reported failures (validation, cycles, node failures) complete
/// the job with a `success=false` result; only infrastructure errors
/// around the engine call fail the job.
async fn execute_job(inner: &Arc<QueueInner>, job: &ExecutionJob) -> Result<Value, String> {
  let engine = (inner.engine_factory)().map_err(|e| format!("engine factory failed: {e}"))?;

  let graph = job.workflow.clone().into_graph();
  let variables = job.options.context_variables();

  let result = engine.execute(&graph, variables).await;
  Ok(client_result(&result))
}

/// Shape an engine result for callers: successful node outputs keyed by
/// node id, plus the overall verdict.
fn client_result(result: &GraphExecutionResult) -> Value {
  let mut results = Map::new();
  for node_result in result.node_results.iter().filter(|r| r.success) {
    results.insert(
      node_result.node_id.clone(),
      json!({ "outputs": node_result.outputs }),
    );
  }

  json!({
    "success": result.success,
    "results": results,
    "execution_order": result.execution_order,
    "error": result.error,
  })
}

/// Load persisted state, demoting RUNNING jobs back to QUEUED.
fn load_state(path: &PathBuf) -> QueueState {
  let mut state = QueueState {
    jobs: HashMap::new(),
    fifo: VecDeque::new(),
    current: None,
  };

  let content = match std::fs::read_to_string(path) {
    Ok(content) => content,
    Err(_) => return state,
  };

  let document: QueueDocument = match serde_json::from_str(&content) {
    Ok(document) => document,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "failed to parse queue document, starting empty");
      return state;
    }
  };

  let mut pending: Vec<ExecutionJob> = Vec::new();
  for mut job in document.jobs {
    if job.status.is_pending() {
      job.status = JobStatus::Queued;
      job.started_at = None;
      pending.push(job.clone());
    }
    state.jobs.insert(job.id.clone(), job);
  }

  // Strict enqueue order survives the restart.
  pending.sort_by_key(|job| job.created_at);
  state.fifo = pending.into_iter().map(|job| job.id).collect();
  state.update_positions();

  info!(
    total = state.jobs.len(),
    pending = state.fifo.len(),
    "queue_state_loaded"
  );
  state
}

/// Persist the document write-then-rename, truncating old terminal jobs.
fn persist_state(config: &QueueConfig, path: &PathBuf, state: &QueueState) {
  let mut jobs: Vec<&ExecutionJob> = state.jobs.values().collect();
  jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

  let mut retained = Vec::with_capacity(jobs.len());
  let mut terminal_kept = 0usize;
  for job in jobs {
    if job.status.is_pending() {
      retained.push(job.clone());
    } else if terminal_kept < config.max_completed_retained {
      retained.push(job.clone());
      terminal_kept += 1;
    }
  }

  let document = QueueDocument {
    jobs: retained,
    saved_at: Utc::now().timestamp(),
  };

  let serialized = match serde_json::to_string_pretty(&document) {
    Ok(serialized) => serialized,
    Err(e) => {
      warn!(error = %e, "failed to serialize queue document");
      return;
    }
  };

  let tmp_path = path.with_extension("json.tmp");
  if let Err(e) =
    std::fs::write(&tmp_path, serialized).and_then(|_| std::fs::rename(&tmp_path, path))
  {
    warn!(path = %path.display(), error = %e, "failed to persist queue document");
    return;
  }

  debug!(jobs = document.jobs.len(), "queue_state_saved");
}
