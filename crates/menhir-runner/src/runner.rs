//! The workflow runner.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use menhir_engine::ExecutionEngine;
use menhir_node::ExecutionContext;
use menhir_workflow::NodeGraph;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::RunnerError;
use crate::workflow::{
  ErrorCallback, RunnerState, RunningWorkflow, TickCallback, TickResults, WorkflowStatus,
  sanitized_results,
};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
  /// Base tick interval; each iteration sleeps `interval - elapsed`.
  pub tick_interval: Duration,
  /// Cap on total RUNNING workflows. `None` disables the cap.
  pub max_running: Option<usize>,
  /// Cap per caller, keyed on the `user_id` context variable.
  pub max_per_caller: Option<usize>,
  /// Consecutive failed ticks after which a workflow is stopped.
  pub max_consecutive_failures: u32,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      tick_interval: Duration::from_millis(100),
      max_running: None,
      max_per_caller: None,
      max_consecutive_failures: 10,
    }
  }
}

struct TickTask {
  handle: Option<JoinHandle<()>>,
  cancel: CancellationToken,
}

struct RunnerInner {
  engine: ExecutionEngine,
  config: RunnerConfig,
  workflows: tokio::sync::Mutex<HashMap<String, RunningWorkflow>>,
  tick_task: std::sync::Mutex<TickTask>,
}

/// Manages continuous workflow execution with tick-based scheduling.
///
/// One tick loop serves every workflow registered on this runner; all
/// per-tick processing is serialized on that loop.
#[derive(Clone)]
pub struct WorkflowRunner {
  inner: Arc<RunnerInner>,
}

impl WorkflowRunner {
  pub fn new(engine: ExecutionEngine, config: RunnerConfig) -> Self {
    Self {
      inner: Arc::new(RunnerInner {
        engine,
        config,
        workflows: tokio::sync::Mutex::new(HashMap::new()),
        tick_task: std::sync::Mutex::new(TickTask {
          handle: None,
          cancel: CancellationToken::new(),
        }),
      }),
    }
  }

  /// Start a workflow.
  ///
  /// Graphs without autonomous nodes execute exactly once; the result goes
  /// to `on_tick_complete` and nothing is registered. Otherwise the
  /// workflow is registered RUNNING and the tick loop drives it until
  /// stopped.
  pub async fn start_workflow(
    &self,
    graph: NodeGraph,
    variables: Map<String, Value>,
    on_tick_complete: Option<TickCallback>,
    on_error: Option<ErrorCallback>,
  ) -> Result<String, RunnerError> {
    let workflow_id = if graph.id.is_empty() {
      format!("workflow-{}", uuid::Uuid::new_v4())
    } else {
      graph.id.clone()
    };

    {
      let workflows = self.inner.workflows.lock().await;
      if let Some(existing) = workflows.get(&workflow_id) {
        if existing.state == RunnerState::Running {
          warn!(workflow_id = %workflow_id, "workflow already running");
          return Ok(workflow_id);
        }
      }
    }

    graph.validate().map_err(menhir_engine::EngineError::from)?;

    let nodes = self.inner.engine.build_nodes(&graph)?;
    let autonomous: Vec<String> = nodes
      .iter()
      .filter(|(_, node)| node.is_autonomous())
      .map(|(id, _)| id.clone())
      .collect();

    if autonomous.is_empty() {
      info!(workflow_id = %workflow_id, "no autonomous nodes, executing once");
      let result = self.inner.engine.execute(&graph, variables).await;
      if let Some(callback) = &on_tick_complete {
        callback(&TickResults::from_one_shot(&result));
      }
      return Ok(workflow_id);
    }

    {
      let mut workflows = self.inner.workflows.lock().await;
      self.check_admission(&workflows, &variables)?;

      let context =
        ExecutionContext::new(self.inner.engine.container().clone(), variables);

      info!(
        workflow_id = %workflow_id,
        node_count = nodes.len(),
        autonomous_count = autonomous.len(),
        "workflow_started_continuous"
      );

      workflows.insert(
        workflow_id.clone(),
        RunningWorkflow {
          workflow_id: workflow_id.clone(),
          graph,
          state: RunnerState::Running,
          tick_count: 0,
          last_tick_time: None,
          nodes,
          context,
          autonomous,
          on_tick_complete,
          on_error,
          latest_results: None,
          results_version: 0,
          consecutive_failures: 0,
        },
      );
    }

    self.ensure_tick_task();
    Ok(workflow_id)
  }

  /// Stop a workflow. Returns false for unknown ids.
  pub async fn stop_workflow(&self, workflow_id: &str) -> bool {
    let removed = {
      let mut workflows = self.inner.workflows.lock().await;
      match workflows.remove(workflow_id) {
        Some(mut running) => {
          running.state = RunnerState::Stopped;
          info!(
            workflow_id = %workflow_id,
            tick_count = running.tick_count,
            "workflow_stopped"
          );
          Some(workflows.is_empty())
        }
        None => {
          warn!(workflow_id = %workflow_id, "workflow not found");
          None
        }
      }
    };

    match removed {
      Some(true) => {
        self.stop_tick_task().await;
        true
      }
      Some(false) => true,
      None => false,
    }
  }

  /// Stop every registered workflow, then join the tick loop.
  pub async fn stop_all(&self) {
    {
      let mut workflows = self.inner.workflows.lock().await;
      for (workflow_id, running) in workflows.iter_mut() {
        running.state = RunnerState::Stopped;
        info!(workflow_id = %workflow_id, "workflow_stopped");
      }
      workflows.clear();
    }
    self.stop_tick_task().await;
  }

  /// Status snapshot for a registered workflow.
  pub async fn get_status(&self, workflow_id: &str) -> Option<WorkflowStatus> {
    let workflows = self.inner.workflows.lock().await;
    workflows.get(workflow_id).map(RunningWorkflow::status)
  }

  /// Ids of workflows currently RUNNING.
  pub async fn list_running(&self) -> Vec<String> {
    let workflows = self.inner.workflows.lock().await;
    workflows
      .values()
      .filter(|w| w.state == RunnerState::Running)
      .map(|w| w.workflow_id.clone())
      .collect()
  }

  fn check_admission(
    &self,
    workflows: &HashMap<String, RunningWorkflow>,
    variables: &Map<String, Value>,
  ) -> Result<(), RunnerError> {
    let running_count = workflows
      .values()
      .filter(|w| w.state == RunnerState::Running)
      .count();

    if let Some(limit) = self.inner.config.max_running {
      if running_count >= limit {
        return Err(RunnerError::RunningLimit {
          limit,
          current: running_count,
        });
      }
    }

    if let Some(limit) = self.inner.config.max_per_caller {
      let caller = caller_id(variables);
      let caller_count = workflows
        .values()
        .filter(|w| {
          w.state == RunnerState::Running && caller_id(&w.context.variables) == caller
        })
        .count();
      if caller_count >= limit {
        return Err(RunnerError::CallerLimit {
          caller,
          limit,
          current: caller_count,
        });
      }
    }

    Ok(())
  }

  fn ensure_tick_task(&self) {
    let mut task = self.inner.tick_task.lock().expect("tick task lock poisoned");
    if task.handle.as_ref().is_some_and(|h| !h.is_finished()) {
      return;
    }

    let cancel = CancellationToken::new();
    task.cancel = cancel.clone();
    let inner = self.inner.clone();
    task.handle = Some(tokio::spawn(tick_loop(inner, cancel)));
    debug!("runner_tick_loop_spawned");
  }

  async fn stop_tick_task(&self) {
    let (handle, cancel) = {
      let mut task = self.inner.tick_task.lock().expect("tick task lock poisoned");
      (task.handle.take(), task.cancel.clone())
    };
    cancel.cancel();
    if let Some(handle) = handle {
      // Best-effort join; the loop exits at the next iteration boundary.
      let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
  }
}

/// Caller key for per-caller admission limits.
fn caller_id(variables: &Map<String, Value>) -> String {
  variables
    .get("user_id")
    .and_then(Value::as_str)
    .unwrap_or("anonymous")
    .to_string()
}

/// The tick loop: one per runner instance.
async fn tick_loop(inner: Arc<RunnerInner>, cancel: CancellationToken) {
  info!("runner_tick_loop_started");

  loop {
    let tick_started = Instant::now();

    {
      let mut workflows = inner.workflows.lock().await;
      let ids: Vec<String> = workflows
        .values()
        .filter(|w| w.state == RunnerState::Running)
        .map(|w| w.workflow_id.clone())
        .collect();

      for workflow_id in ids {
        let Some(running) = workflows.get_mut(&workflow_id) else {
          continue;
        };
        if running.state != RunnerState::Running {
          continue;
        }

        process_tick(&inner.engine, running, inner.config.max_consecutive_failures).await;

        if running.state == RunnerState::Stopped {
          workflows.remove(&workflow_id);
        }
      }

      if workflows.is_empty() {
        break;
      }
    }

    let sleep_for = inner
      .config
      .tick_interval
      .saturating_sub(tick_started.elapsed());

    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(sleep_for) => {}
    }
  }

  info!("runner_tick_loop_stopped");
}

/// Process one tick for one workflow.
async fn process_tick(
  engine: &ExecutionEngine,
  running: &mut RunningWorkflow,
  max_consecutive_failures: u32,
) {
  running.tick_count += 1;
  running.last_tick_time = Some(Utc::now());

  let mut triggered: HashSet<String> = HashSet::new();

  let autonomous = running.autonomous.clone();
  for node_id in autonomous {
    let outcome = {
      let RunningWorkflow { nodes, context, .. } = running;
      let Some(node) = nodes.get_mut(&node_id) else {
        continue;
      };
      node.on_tick(&*context).await
    };

    match outcome {
      Ok(Some(outputs)) => {
        running.context.node_outputs.insert(node_id.clone(), outputs);
        triggered.insert(node_id);
      }
      Ok(None) => {}
      Err(e) => {
        // A failing autonomous node aborts this tick but not the workflow.
        error!(
          workflow_id = %running.workflow_id,
          node_id = %node_id,
          error = %e,
          "tick_failed"
        );
        if let Some(callback) = &running.on_error {
          callback(&e.to_string());
        }
        running.consecutive_failures += 1;
        enforce_failure_threshold(running, max_consecutive_failures);
        return;
      }
    }
  }

  if triggered.is_empty() {
    return;
  }

  execute_subgraph(engine, running, &triggered).await;
  enforce_failure_threshold(running, max_consecutive_failures);
}

/// Derive and execute the sub-graph affected by the triggered nodes.
async fn execute_subgraph(
  engine: &ExecutionEngine,
  running: &mut RunningWorkflow,
  triggered: &HashSet<String>,
) {
  let graph_view = running.graph.graph();
  let autonomous: HashSet<&str> = running.autonomous.iter().map(String::as_str).collect();

  // Downstream closure of the triggered nodes, triggered nodes included.
  let mut affected = graph_view.downstream_closure(triggered.iter().cloned());

  // Dependency closure: non-autonomous nodes in the affected set pull in
  // their transitive upstream predecessors. Autonomous sources stay out;
  // they participate only through their current tick outputs.
  let mut queue: VecDeque<String> = affected.iter().cloned().collect();
  while let Some(node_id) = queue.pop_front() {
    if autonomous.contains(node_id.as_str()) {
      continue;
    }
    for upstream in graph_view.upstream(&node_id) {
      if autonomous.contains(upstream.as_str()) {
        continue;
      }
      if affected.insert(upstream.clone()) {
        queue.push_back(upstream.clone());
      }
    }
  }

  let derived = running.graph.subgraph(&affected);
  let presatisfied: HashSet<String> = affected
    .iter()
    .filter(|id| autonomous.contains(id.as_str()))
    .cloned()
    .collect();

  info!(
    workflow_id = %running.workflow_id,
    tick = running.tick_count,
    node_count = derived.nodes.len(),
    "subgraph_triggered"
  );

  let result = {
    let RunningWorkflow { nodes, context, .. } = running;
    engine
      .execute_with(&derived, nodes, context, &presatisfied)
      .await
  };

  running.results_version += 1;
  let latest = TickResults {
    tick: running.tick_count,
    success: result.success,
    executed_nodes: result.execution_order.clone(),
    results: sanitized_results(&result.node_results),
    error: result.error.clone(),
    version: running.results_version,
  };

  if result.success {
    running.consecutive_failures = 0;
    debug!(
      workflow_id = %running.workflow_id,
      version = running.results_version,
      "subgraph_completed"
    );
  } else {
    running.consecutive_failures += 1;
    error!(
      workflow_id = %running.workflow_id,
      error = result.error.as_deref().unwrap_or("unknown"),
      "subgraph_failed"
    );
    if let (Some(callback), Some(message)) = (&running.on_error, &result.error) {
      callback(message);
    }
  }

  running.latest_results = Some(latest.clone());
  if let Some(callback) = &running.on_tick_complete {
    callback(&latest);
  }
}

/// Stop a workflow that keeps failing tick after tick.
fn enforce_failure_threshold(running: &mut RunningWorkflow, max_consecutive_failures: u32) {
  if max_consecutive_failures == 0 {
    return;
  }
  if running.consecutive_failures >= max_consecutive_failures {
    warn!(
      workflow_id = %running.workflow_id,
      failures = running.consecutive_failures,
      "stopping workflow after repeated tick failures"
    );
    running.state = RunnerState::Stopped;
  }
}
