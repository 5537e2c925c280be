//! Integration tests for the execution queue: admission, ordering,
//! cancellation, persistence round-trip, and restart recovery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use menhir_engine::ExecutionEngine;
use menhir_node::{ExecutionContext, Node, NodeError, Outputs, ResolvedInputs, ServiceContainer};
use menhir_nodes::builtin_registry;
use menhir_queue::{
  EngineFactory, ExecutionJob, ExecutionOptions, ExecutionQueue, JobStatus, QueueConfig,
  QueueDocument, QueueError,
};
use menhir_workflow::WorkflowDoc;
use serde_json::{Map, json};

fn doc(id: &str) -> WorkflowDoc {
  serde_json::from_value(json!({
    "id": id,
    "name": "test workflow",
    "nodes": [
      {"id": "a", "type": "text", "inputs": {"text": "hi"}},
      {"id": "out", "type": "output_text"}
    ],
    "connections": [
      {"from": "a", "from_output": "text", "to": "out", "to_input": "response"}
    ]
  }))
  .unwrap()
}

fn options(user: &str) -> ExecutionOptions {
  ExecutionOptions {
    user_id: Some(user.to_string()),
    ..ExecutionOptions::default()
  }
}

fn factory() -> EngineFactory {
  Arc::new(|| {
    Ok(ExecutionEngine::new(
      Arc::new(builtin_registry()),
      Arc::new(ServiceContainer::empty()),
    ))
  })
}

struct SlowNode;

#[async_trait]
impl Node for SlowNode {
  async fn execute(
    &mut self,
    _inputs: &ResolvedInputs,
    _ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(Map::new())
  }
}

fn slow_factory() -> EngineFactory {
  Arc::new(|| {
    let mut registry = builtin_registry();
    registry.register("slow", |_spec| Ok(Box::new(SlowNode) as Box<dyn Node>));
    Ok(ExecutionEngine::new(
      Arc::new(registry),
      Arc::new(ServiceContainer::empty()),
    ))
  })
}

fn slow_doc(id: &str) -> WorkflowDoc {
  serde_json::from_value(json!({
    "id": id,
    "name": "slow",
    "nodes": [{"id": "s", "type": "slow"}],
    "connections": []
  }))
  .unwrap()
}

async fn wait_for_status(queue: &ExecutionQueue, job_id: &str, status: JobStatus) {
  for _ in 0..100 {
    if queue.get_job(job_id).map(|j| j.status) == Some(status) {
      return;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
  panic!(
    "job {job_id} never reached {status:?}, currently {:?}",
    queue.get_job(job_id).map(|j| j.status)
  );
}

#[tokio::test(flavor = "multi_thread")]
async fn admission_enforces_global_and_per_caller_limits() {
  let dir = tempfile::tempdir().unwrap();
  let queue = ExecutionQueue::open(
    QueueConfig {
      max_queue_size: 2,
      max_jobs_per_user: 1,
      ..QueueConfig::new(dir.path())
    },
    factory(),
  )
  .unwrap();

  // First job for u1 is admitted at position 0.
  let job1 = queue.enqueue(doc("w1"), options("u1")).unwrap();
  assert_eq!(job1.position, 0);
  assert_eq!(job1.status, JobStatus::Queued);

  // Second u1 job trips the per-caller cap.
  let err = queue.enqueue(doc("w2"), options("u1")).unwrap_err();
  assert!(matches!(err, QueueError::CallerLimit { limit: 1, .. }));

  // A different caller still fits.
  let job3 = queue.enqueue(doc("w3"), options("u2")).unwrap();
  assert_eq!(job3.position, 1);

  // The queue itself is now full; the global cap fires first.
  let err = queue.enqueue(doc("w4"), options("u2")).unwrap_err();
  assert!(matches!(err, QueueError::QueueFull { limit: 2 }));
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_requeues_running_jobs_and_keeps_completed() {
  let dir = tempfile::tempdir().unwrap();

  let j1 = ExecutionJob {
    id: "j1".to_string(),
    workflow: doc("w1"),
    options: options("u1"),
    status: JobStatus::Running,
    created_at: DateTime::from_timestamp_micros(1_000_000).unwrap(),
    started_at: Some(DateTime::from_timestamp_micros(2_000_000).unwrap()),
    completed_at: None,
    result: None,
    error: None,
    position: 0,
  };
  let j2 = ExecutionJob {
    id: "j2".to_string(),
    workflow: doc("w2"),
    options: options("u2"),
    status: JobStatus::Completed,
    created_at: DateTime::from_timestamp_micros(500_000).unwrap(),
    started_at: Some(DateTime::from_timestamp_micros(600_000).unwrap()),
    completed_at: Some(DateTime::from_timestamp_micros(700_000).unwrap()),
    result: Some(json!({"success": true})),
    error: None,
    position: 0,
  };
  let document = QueueDocument {
    jobs: vec![j1, j2],
    saved_at: Utc::now().timestamp(),
  };
  std::fs::write(
    dir.path().join("execution_queue.json"),
    serde_json::to_string_pretty(&document).unwrap(),
  )
  .unwrap();

  let queue = ExecutionQueue::open(QueueConfig::new(dir.path()), factory()).unwrap();

  // The interrupted RUNNING job is back at the head of the queue.
  let status = queue.get_status("j1").unwrap();
  assert_eq!(status.status, JobStatus::Queued);
  assert_eq!(status.position, Some(0));

  // The completed job survives untouched.
  let status = queue.get_status("j2").unwrap();
  assert_eq!(status.status, JobStatus::Completed);
  assert!(status.has_result);

  // The worker subsequently processes the recovered job.
  queue.start_worker();
  wait_for_status(&queue, "j1", JobStatus::Completed).await;
  let result = queue.get_result("j1").unwrap();
  assert_eq!(result["success"], json!(true));
  assert_eq!(result["results"]["out"]["outputs"]["text"], json!("hi"));
  queue.stop_worker().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_removes_queued_jobs_and_never_runs_them() {
  let dir = tempfile::tempdir().unwrap();
  let queue = ExecutionQueue::open(QueueConfig::new(dir.path()), factory()).unwrap();

  let first = queue.enqueue(doc("w1"), options("u1")).unwrap();
  let second = queue.enqueue(doc("w2"), options("u2")).unwrap();
  assert_eq!(second.position, 1);

  assert!(queue.cancel(&first.id));
  assert!(!queue.cancel(&first.id));

  // Positions compact after the removal.
  assert_eq!(queue.get_status(&second.id).unwrap().position, Some(0));

  queue.start_worker();
  wait_for_status(&queue, &second.id, JobStatus::Completed).await;
  queue.stop_worker().await;

  // The cancelled job stayed cancelled and produced nothing.
  let first = queue.get_job(&first.id).unwrap();
  assert_eq!(first.status, JobStatus::Cancelled);
  assert!(first.result.is_none());
  assert!(queue.get_result(&first.id).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn running_jobs_cannot_be_cancelled() {
  let dir = tempfile::tempdir().unwrap();
  let queue = ExecutionQueue::open(QueueConfig::new(dir.path()), slow_factory()).unwrap();

  let job = queue.enqueue(slow_doc("w1"), options("u1")).unwrap();
  queue.start_worker();
  wait_for_status(&queue, &job.id, JobStatus::Running).await;

  assert!(!queue.cancel(&job.id));
  let info = queue.queue_info();
  assert!(info.is_processing);
  assert_eq!(info.current_job.as_deref(), Some(job.id.as_str()));

  wait_for_status(&queue, &job.id, JobStatus::Completed).await;
  queue.stop_worker().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn jobs_start_in_enqueue_order_one_at_a_time() {
  let dir = tempfile::tempdir().unwrap();
  let queue = ExecutionQueue::open(QueueConfig::new(dir.path()), slow_factory()).unwrap();

  let ids: Vec<String> = (0..3)
    .map(|i| {
      queue
        .enqueue(slow_doc(&format!("w{i}")), options(&format!("u{i}")))
        .unwrap()
        .id
    })
    .collect();

  queue.start_worker();

  // While draining, at most one job is ever RUNNING.
  for _ in 0..30 {
    let running = ids
      .iter()
      .filter(|id| queue.get_job(id).map(|j| j.status) == Some(JobStatus::Running))
      .count();
    assert!(running <= 1, "found {running} jobs running concurrently");
    tokio::time::sleep(Duration::from_millis(25)).await;
  }

  for id in &ids {
    wait_for_status(&queue, id, JobStatus::Completed).await;
  }
  queue.stop_worker().await;

  // Start times follow enqueue order.
  let starts: Vec<_> = ids
    .iter()
    .map(|id| queue.get_job(id).unwrap().started_at.unwrap())
    .collect();
  assert!(starts[0] <= starts[1]);
  assert!(starts[1] <= starts[2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_reported_failures_complete_with_failed_result() {
  let dir = tempfile::tempdir().unwrap();
  let queue = ExecutionQueue::open(QueueConfig::new(dir.path()), factory()).unwrap();

  let bad: WorkflowDoc = serde_json::from_value(json!({
    "id": "bad",
    "name": "bad",
    "nodes": [{"id": "g", "type": "ghost"}],
    "connections": []
  }))
  .unwrap();

  let job = queue.enqueue(bad, options("u1")).unwrap();
  queue.start_worker();
  wait_for_status(&queue, &job.id, JobStatus::Completed).await;
  queue.stop_worker().await;

  let result = queue.get_result(&job.id).unwrap();
  assert_eq!(result["success"], json!(false));
  assert!(
    result["error"]
      .as_str()
      .unwrap()
      .contains("unknown node type")
  );
}

#[tokio::test(flavor = "multi_thread")]
async fn factory_failures_fail_the_job() {
  let dir = tempfile::tempdir().unwrap();
  let broken: EngineFactory = Arc::new(|| Err("model offline".to_string()));
  let queue = ExecutionQueue::open(QueueConfig::new(dir.path()), broken).unwrap();

  let job = queue.enqueue(doc("w1"), options("u1")).unwrap();
  queue.start_worker();
  wait_for_status(&queue, &job.id, JobStatus::Failed).await;
  queue.stop_worker().await;

  let result = queue.get_result(&job.id).unwrap();
  assert!(result["error"].as_str().unwrap().contains("model offline"));
}

#[test]
fn persisted_document_round_trips() {
  let document = QueueDocument {
    jobs: vec![
      ExecutionJob {
        id: "j1".to_string(),
        workflow: doc("w1"),
        options: options("u1"),
        status: JobStatus::Queued,
        created_at: DateTime::from_timestamp_micros(42_000_000).unwrap(),
        started_at: None,
        completed_at: None,
        result: None,
        error: None,
        position: 0,
      },
      ExecutionJob {
        id: "j2".to_string(),
        workflow: doc("w2"),
        options: ExecutionOptions::default(),
        status: JobStatus::Failed,
        created_at: DateTime::from_timestamp_micros(41_000_000).unwrap(),
        started_at: Some(DateTime::from_timestamp_micros(43_000_000).unwrap()),
        completed_at: Some(DateTime::from_timestamp_micros(44_000_000).unwrap()),
        result: None,
        error: Some("boom".to_string()),
        position: 0,
      },
    ],
    saved_at: 1_700_000_000,
  };

  let serialized = serde_json::to_string_pretty(&document).unwrap();
  let parsed: QueueDocument = serde_json::from_str(&serialized).unwrap();
  assert_eq!(parsed, document);
}
