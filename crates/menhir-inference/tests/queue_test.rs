//! Integration tests for the inference queue: ordering, mutual exclusion,
//! timeout cancellation, queue-full admission, and error folding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use menhir_host::{GenerationModel, GenerationRequest, GenerationResponse, ModelError};
use menhir_inference::{InferenceConfig, InferenceError, InferenceQueue, clamp_request};
use serde_json::Map;

/// Model that records which queries started and asserts it is never
/// entered concurrently.
struct SlowModel {
  delay: Duration,
  starts: Arc<Mutex<Vec<String>>>,
  in_flight: Arc<AtomicBool>,
}

impl SlowModel {
  fn new(delay: Duration) -> Self {
    Self {
      delay,
      starts: Arc::new(Mutex::new(Vec::new())),
      in_flight: Arc::new(AtomicBool::new(false)),
    }
  }
}

#[async_trait]
impl GenerationModel for SlowModel {
  async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ModelError> {
    let was_busy = self.in_flight.swap(true, Ordering::SeqCst);
    assert!(!was_busy, "two generate calls ran concurrently");

    self.starts.lock().unwrap().push(request.query.clone());
    tokio::time::sleep(self.delay).await;

    self.in_flight.store(false, Ordering::SeqCst);
    Ok(GenerationResponse {
      response: format!("done: {}", request.query),
      thinking_content: String::new(),
      model: "slow".to_string(),
      input_tokens: 1,
      output_tokens: 1,
      generation_params: Map::new(),
      source: "test".to_string(),
      error: None,
    })
  }

  fn name(&self) -> &str {
    "slow"
  }
}

struct FailingModel;

#[async_trait]
impl GenerationModel for FailingModel {
  async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, ModelError> {
    Err(ModelError::Generation {
      message: "backend exploded".to_string(),
    })
  }

  fn name(&self) -> &str {
    "failing"
  }
}

struct RecordingModel {
  received: Arc<Mutex<Vec<GenerationRequest>>>,
}

#[async_trait]
impl GenerationModel for RecordingModel {
  async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ModelError> {
    self.received.lock().unwrap().push(request);
    Ok(GenerationResponse {
      response: String::new(),
      thinking_content: String::new(),
      model: "recording".to_string(),
      input_tokens: 0,
      output_tokens: 0,
      generation_params: Map::new(),
      source: "test".to_string(),
      error: None,
    })
  }

  fn name(&self) -> &str {
    "recording"
  }
}

fn request(query: &str) -> GenerationRequest {
  GenerationRequest::new(query, "system")
}

#[tokio::test(flavor = "multi_thread")]
async fn requests_run_in_order_and_timeouts_do_not_cancel_others() {
  let model = Arc::new(SlowModel::new(Duration::from_millis(100)));
  let starts = model.starts.clone();
  let queue = Arc::new(InferenceQueue::start(
    model,
    InferenceConfig {
      max_queue_size: 10,
      ..InferenceConfig::default()
    },
  ));

  let q1 = queue.clone();
  let r1 = tokio::spawn(async move { q1.submit(request("r1"), None).await });
  tokio::time::sleep(Duration::from_millis(20)).await;

  let q2 = queue.clone();
  let r2 = tokio::spawn(async move { q2.submit(request("r2"), None).await });
  tokio::time::sleep(Duration::from_millis(10)).await;

  // R3's caller gives up long before R1's generate even finishes.
  let q3 = queue.clone();
  let r3 = tokio::spawn(async move {
    q3.submit(request("r3"), Some(Duration::from_millis(40)))
      .await
  });

  let r3 = r3.await.unwrap();
  assert!(matches!(r3, Err(InferenceError::Timeout { .. })));

  let r1 = r1.await.unwrap().unwrap();
  let r2 = r2.await.unwrap().unwrap();
  assert_eq!(r1.response, "done: r1");
  assert_eq!(r2.response, "done: r2");

  // Give the worker time to reach and discard R3's cancelled entry.
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(*starts.lock().unwrap(), vec!["r1", "r2"]);
  assert_eq!(queue.total_processed(), 2);

  queue.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn full_queue_rejects_without_blocking() {
  let model = Arc::new(SlowModel::new(Duration::from_millis(200)));
  let queue = Arc::new(InferenceQueue::start(
    model,
    InferenceConfig {
      max_queue_size: 1,
      ..InferenceConfig::default()
    },
  ));

  // First request occupies the worker, second fills the queue slot.
  let q1 = queue.clone();
  let h1 = tokio::spawn(async move { q1.submit(request("a"), None).await });
  tokio::time::sleep(Duration::from_millis(30)).await;

  let q2 = queue.clone();
  let h2 = tokio::spawn(async move { q2.submit(request("b"), None).await });
  tokio::time::sleep(Duration::from_millis(10)).await;

  let overflow = queue.submit(request("c"), None).await;
  assert!(matches!(overflow, Err(InferenceError::QueueFull { limit: 1 })));

  assert!(h1.await.unwrap().is_ok());
  assert!(h2.await.unwrap().is_ok());
  queue.stop().await;
}

#[tokio::test]
async fn model_errors_fold_into_responses() {
  let queue = InferenceQueue::start(Arc::new(FailingModel), InferenceConfig::default());

  let response = queue.submit(request("boom"), None).await.unwrap();
  assert_eq!(response.response, "");
  assert_eq!(response.source, "error");
  assert!(response.error.as_deref().unwrap().contains("backend exploded"));

  queue.stop().await;
}

#[tokio::test]
async fn worker_clamps_parameters() {
  let received = Arc::new(Mutex::new(Vec::new()));
  let queue = InferenceQueue::start(
    Arc::new(RecordingModel {
      received: received.clone(),
    }),
    InferenceConfig {
      max_output_tokens: 2048,
      ..InferenceConfig::default()
    },
  );

  let mut wild = request("clamp me");
  wild.temperature = 99.0;
  wild.top_p = 0.0;
  wild.top_k = 5000;
  wild.repetition_penalty = 0.1;
  wild.max_tokens = 1_000_000;
  queue.submit(wild, None).await.unwrap();

  let seen = received.lock().unwrap();
  assert_eq!(seen.len(), 1);
  assert_eq!(seen[0].temperature, 2.0);
  assert_eq!(seen[0].top_p, 0.01);
  assert_eq!(seen[0].top_k, 200);
  assert_eq!(seen[0].repetition_penalty, 1.0);
  assert_eq!(seen[0].max_tokens, 2048);

  queue.stop().await;
}

#[test]
fn clamp_is_identity_inside_bounds() {
  let request = request("ok");
  let clamped = clamp_request(request.clone(), 1024);
  assert_eq!(clamped, request);
}
