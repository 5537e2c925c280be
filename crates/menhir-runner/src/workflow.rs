use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use menhir_engine::{GraphExecutionResult, NodeExecutionResult};
use menhir_node::{ExecutionContext, Node};
use menhir_workflow::NodeGraph;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::sanitize::{MAX_SANITIZE_DEPTH, sanitize};

/// State of a running workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
  Stopped,
  Running,
  Paused,
}

/// Callback invoked with the latest results after each sub-graph execution.
pub type TickCallback = Arc<dyn Fn(&TickResults) + Send + Sync>;

/// Callback invoked with an error message when a tick fails.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Versioned result surface for external pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResults {
  pub tick: u64,
  pub success: bool,
  pub executed_nodes: Vec<String>,
  /// node_id -> `{"outputs": …}`, successes only, sanitized.
  pub results: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub version: u64,
}

impl TickResults {
  /// Wrap a one-shot engine result for the no-autonomous-node shortcut.
  pub fn from_one_shot(result: &GraphExecutionResult) -> Self {
    Self {
      tick: 0,
      success: result.success,
      executed_nodes: result.execution_order.clone(),
      results: sanitized_results(&result.node_results),
      error: result.error.clone(),
      version: 1,
    }
  }
}

/// Successful per-node outputs, sanitized for external consumers.
pub(crate) fn sanitized_results(node_results: &[NodeExecutionResult]) -> Map<String, Value> {
  let mut results = Map::new();
  for node_result in node_results.iter().filter(|r| r.success) {
    let outputs = sanitize(
      &Value::Object(node_result.outputs.clone()),
      MAX_SANITIZE_DEPTH,
    );
    results.insert(node_result.node_id.clone(), json!({ "outputs": outputs }));
  }
  results
}

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
  pub workflow_id: String,
  pub state: RunnerState,
  pub tick_count: u64,
  pub last_tick_time: Option<DateTime<Utc>>,
  pub node_count: usize,
  pub latest_results: Option<TickResults>,
  pub results_version: u64,
}

/// Runner-owned record of one continuous workflow.
pub(crate) struct RunningWorkflow {
  pub workflow_id: String,
  pub graph: NodeGraph,
  pub state: RunnerState,
  pub tick_count: u64,
  pub last_tick_time: Option<DateTime<Utc>>,
  pub nodes: HashMap<String, Box<dyn Node>>,
  pub context: ExecutionContext,
  /// Ids of autonomous nodes, cached at start.
  pub autonomous: Vec<String>,
  pub on_tick_complete: Option<TickCallback>,
  pub on_error: Option<ErrorCallback>,
  pub latest_results: Option<TickResults>,
  pub results_version: u64,
  pub consecutive_failures: u32,
}

impl RunningWorkflow {
  pub fn status(&self) -> WorkflowStatus {
    WorkflowStatus {
      workflow_id: self.workflow_id.clone(),
      state: self.state,
      tick_count: self.tick_count,
      last_tick_time: self.last_tick_time,
      node_count: self.nodes.len(),
      latest_results: self.latest_results.clone(),
      results_version: self.results_version,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn node_result(node_id: &str, success: bool) -> NodeExecutionResult {
    let mut outputs = Map::new();
    outputs.insert("text".to_string(), json!("value"));
    NodeExecutionResult {
      node_id: node_id.to_string(),
      success,
      outputs,
      error: (!success).then(|| "failed".to_string()),
      execution_time: 0.001,
    }
  }

  #[test]
  fn sanitized_results_keep_successes_only() {
    let results = sanitized_results(&[node_result("ok", true), node_result("bad", false)]);
    assert!(results.contains_key("ok"));
    assert!(!results.contains_key("bad"));
    assert_eq!(results["ok"]["outputs"]["text"], json!("value"));
  }

  #[test]
  fn one_shot_results_carry_version_one() {
    let result = GraphExecutionResult {
      graph_id: "g".to_string(),
      success: true,
      node_results: vec![node_result("a", true)],
      final_outputs: Map::new(),
      error: None,
      error_kind: None,
      total_execution_time: 0.01,
      execution_order: vec!["a".to_string()],
    };

    let tick = TickResults::from_one_shot(&result);
    assert_eq!(tick.version, 1);
    assert_eq!(tick.tick, 0);
    assert!(tick.success);
    assert_eq!(tick.executed_nodes, vec!["a"]);
  }
}
