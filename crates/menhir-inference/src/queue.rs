//! Inference request queue.
//!
//! Requests enter through a bounded channel; a single worker drains them
//! one at a time and replies through per-request oneshot channels. A caller
//! that times out drops its receiver, and the worker discards the entry
//! without touching the model.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use menhir_host::{GenerationModel, GenerationRequest, GenerationResponse, ModelError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::InferenceError;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
  /// Maximum requests waiting in the queue; excess submissions fail fast.
  pub max_queue_size: usize,
  /// Timeout applied when a caller does not pass one explicitly.
  pub default_timeout: Duration,
  /// Upper clamp for `max_tokens`.
  pub max_output_tokens: u32,
}

impl Default for InferenceConfig {
  fn default() -> Self {
    Self {
      max_queue_size: 100,
      default_timeout: Duration::from_secs(120),
      max_output_tokens: 1024,
    }
  }
}

/// Clamp generation parameters to the ranges the model accepts.
pub fn clamp_request(mut request: GenerationRequest, max_output_tokens: u32) -> GenerationRequest {
  request.temperature = request.temperature.clamp(0.01, 2.0);
  request.top_p = request.top_p.clamp(0.01, 1.0);
  request.top_k = request.top_k.clamp(1, 200);
  request.repetition_penalty = request.repetition_penalty.clamp(1.0, 3.0);
  request.max_tokens = request.max_tokens.clamp(1, max_output_tokens.max(1));
  request
}

struct QueueEntry {
  request: GenerationRequest,
  reply: oneshot::Sender<GenerationResponse>,
}

/// Single-worker queue serializing access to one model instance.
pub struct InferenceQueue {
  tx: mpsc::Sender<QueueEntry>,
  config: InferenceConfig,
  pending: Arc<AtomicUsize>,
  processing: Arc<AtomicBool>,
  total_processed: Arc<AtomicU64>,
  cancel: CancellationToken,
  worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl InferenceQueue {
  /// Start the queue and its worker task.
  pub fn start(model: Arc<dyn GenerationModel>, config: InferenceConfig) -> Self {
    let (tx, rx) = mpsc::channel(config.max_queue_size.max(1));
    let pending = Arc::new(AtomicUsize::new(0));
    let processing = Arc::new(AtomicBool::new(false));
    let total_processed = Arc::new(AtomicU64::new(0));
    let cancel = CancellationToken::new();

    let worker = tokio::spawn(worker_loop(
      rx,
      model,
      config.max_output_tokens,
      cancel.clone(),
      pending.clone(),
      processing.clone(),
      total_processed.clone(),
    ));

    info!(max_queue_size = config.max_queue_size, "inference_queue_started");

    Self {
      tx,
      config,
      pending,
      processing,
      total_processed,
      cancel,
      worker: std::sync::Mutex::new(Some(worker)),
    }
  }

  /// Submit a request and await its response.
  ///
  /// Fails immediately with queue-full when the queue is at capacity. If
  /// `timeout` (or the configured default) elapses before the response
  /// arrives, the pending reply is cancelled; a worker that later dequeues
  /// the entry discards it without running the model.
  pub async fn submit(
    &self,
    request: GenerationRequest,
    timeout: Option<Duration>,
  ) -> Result<GenerationResponse, InferenceError> {
    let (reply, response_rx) = oneshot::channel();

    // Count before sending so the worker's decrement can never observe an
    // entry that was not counted yet.
    self.pending.fetch_add(1, Ordering::SeqCst);
    if let Err(e) = self.tx.try_send(QueueEntry { request, reply }) {
      self.pending.fetch_sub(1, Ordering::SeqCst);
      return Err(match e {
        TrySendError::Full(_) => InferenceError::QueueFull {
          limit: self.config.max_queue_size,
        },
        TrySendError::Closed(_) => InferenceError::NotRunning,
      });
    }

    let timeout = timeout.unwrap_or(self.config.default_timeout);
    match tokio::time::timeout(timeout, response_rx).await {
      Ok(Ok(response)) => Ok(response),
      Ok(Err(_)) => Err(InferenceError::NotRunning),
      Err(_) => {
        // Dropping the receiver cancels the pending reply.
        warn!(timeout_s = timeout.as_secs_f64(), "inference_request_timed_out");
        Err(InferenceError::Timeout {
          timeout_s: timeout.as_secs_f64(),
        })
      }
    }
  }

  /// Requests waiting in the queue (excludes the in-flight request).
  pub fn pending_count(&self) -> usize {
    self.pending.load(Ordering::SeqCst)
  }

  /// Whether a request is currently being processed.
  pub fn is_processing(&self) -> bool {
    self.processing.load(Ordering::SeqCst)
  }

  /// Requests processed since start.
  pub fn total_processed(&self) -> u64 {
    self.total_processed.load(Ordering::SeqCst)
  }

  /// Stop the worker. Pending requests resolve with a not-running error.
  pub async fn stop(&self) {
    self.cancel.cancel();
    let worker = self.worker.lock().expect("worker lock poisoned").take();
    if let Some(worker) = worker {
      let _ = worker.await;
    }
  }
}

async fn worker_loop(
  mut rx: mpsc::Receiver<QueueEntry>,
  model: Arc<dyn GenerationModel>,
  max_output_tokens: u32,
  cancel: CancellationToken,
  pending: Arc<AtomicUsize>,
  processing: Arc<AtomicBool>,
  total_processed: Arc<AtomicU64>,
) {
  info!("inference_worker_started");

  loop {
    let entry = tokio::select! {
      _ = cancel.cancelled() => break,
      entry = rx.recv() => match entry {
        Some(entry) => entry,
        None => break,
      },
    };
    pending.fetch_sub(1, Ordering::SeqCst);

    // Caller already gave up (timeout); do not touch the model.
    if entry.reply.is_closed() {
      debug!("skipping cancelled inference request");
      continue;
    }

    processing.store(true, Ordering::SeqCst);
    let request = clamp_request(entry.request, max_output_tokens);
    let started = Instant::now();

    let response = match model.generate(request).await {
      Ok(response) => response,
      Err(e) => {
        warn!(error = %e, "generation_failed");
        GenerationResponse::from_error(model.name(), e.to_string())
      }
    };

    let elapsed = started.elapsed().as_secs_f64();
    info!(
      elapsed_s = elapsed,
      input_tokens = response.input_tokens,
      output_tokens = response.output_tokens,
      "inference_completed"
    );

    // Send failure just means the caller timed out in the meantime.
    let _ = entry.reply.send(response);
    total_processed.fetch_add(1, Ordering::SeqCst);
    processing.store(false, Ordering::SeqCst);
  }

  info!(
    total_processed = total_processed.load(Ordering::SeqCst),
    "inference_worker_stopped"
  );
}

/// Model-contract adapter over the queue.
///
/// Hand this to the service container so every node-level `generate` call
/// is serialized by the queue.
pub struct QueuedModel {
  queue: Arc<InferenceQueue>,
  name: String,
}

impl QueuedModel {
  pub fn new(queue: Arc<InferenceQueue>, name: impl Into<String>) -> Self {
    Self {
      queue,
      name: name.into(),
    }
  }
}

#[async_trait]
impl GenerationModel for QueuedModel {
  async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ModelError> {
    self
      .queue
      .submit(request, None)
      .await
      .map_err(|e| ModelError::Generation {
        message: e.to_string(),
      })
  }

  fn name(&self) -> &str {
    &self.name
  }
}
