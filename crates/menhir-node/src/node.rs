use async_trait::async_trait;
use menhir_workflow::NodeGraph;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::inputs::ResolvedInputs;

/// A node's output mapping: output name to value.
pub type Outputs = Map<String, Value>;

/// How a node participates in execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
  /// Executes when the graph (or sub-graph) passes over it. The default.
  Once,
  /// Autonomous: additionally polled by the runner once per tick and may
  /// fire by returning outputs from `on_tick`.
  Continuous,
  /// Executes only inside a triggered sub-graph pass.
  Triggered,
}

/// A computation unit in a workflow graph.
///
/// Instances are constructed once per workflow activation via the
/// [`crate::NodeRegistry`] and may be executed many times during a
/// continuous run.
#[async_trait]
pub trait Node: Send {
  /// This node's execution mode. Defaults to [`ExecutionMode::Once`].
  fn execution_mode(&self) -> ExecutionMode {
    ExecutionMode::Once
  }

  /// Whether this node's outputs are merged into the graph's final outputs.
  fn is_terminal_output(&self) -> bool {
    false
  }

  /// Post-build hook, invoked after every node instance for the graph
  /// exists but before the first execution. For wiring, never for I/O.
  fn initialize(&mut self, _graph: &NodeGraph) -> Result<(), NodeError> {
    Ok(())
  }

  /// Execute the node with inputs resolved by the engine.
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError>;

  /// Called by the runner once per tick on autonomous nodes. Returning
  /// `Some(outputs)` means the node is firing now; `None` means no event.
  async fn on_tick(&mut self, _ctx: &ExecutionContext) -> Result<Option<Outputs>, NodeError> {
    Ok(None)
  }

  /// Whether the runner polls this node each tick.
  fn is_autonomous(&self) -> bool {
    self.execution_mode() == ExecutionMode::Continuous
  }
}
