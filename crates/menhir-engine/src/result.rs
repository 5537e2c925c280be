use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorKind;

/// Result of a single node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionResult {
  pub node_id: String,
  pub success: bool,
  #[serde(default)]
  pub outputs: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Wall-clock execution time in seconds.
  pub execution_time: f64,
}

/// Result of a complete graph (or sub-graph) execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExecutionResult {
  pub graph_id: String,
  pub success: bool,
  pub node_results: Vec<NodeExecutionResult>,
  /// Union of the outputs of all terminal output nodes, merged in
  /// execution order (later writers win on key conflict).
  pub final_outputs: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_kind: Option<ErrorKind>,
  pub total_execution_time: f64,
  pub execution_order: Vec<String>,
}

impl GraphExecutionResult {
  /// Per-node result by id, if that node ran.
  pub fn node_result(&self, node_id: &str) -> Option<&NodeExecutionResult> {
    self.node_results.iter().find(|r| r.node_id == node_id)
  }
}
