//! Workflow execution engine.
//!
//! `ExecutionEngine` validates a graph, builds node instances through the
//! registry, resolves a deterministic topological order, and executes nodes
//! sequentially. A failing node stops the pass; remaining nodes do not run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use menhir_node::{ExecutionContext, Node, NodeRegistry, ServiceContainer};
use menhir_workflow::NodeGraph;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::error::EngineError;
use crate::input::resolve_node_inputs;
use crate::result::{GraphExecutionResult, NodeExecutionResult};

/// The workflow execution engine.
///
/// Holds the node registry and the collaborator container; both are shared
/// handles, so engines are cheap to construct per call site.
pub struct ExecutionEngine {
  registry: Arc<NodeRegistry>,
  container: Arc<ServiceContainer>,
}

impl ExecutionEngine {
  pub fn new(registry: Arc<NodeRegistry>, container: Arc<ServiceContainer>) -> Self {
    Self {
      registry,
      container,
    }
  }

  pub fn registry(&self) -> &Arc<NodeRegistry> {
    &self.registry
  }

  pub fn container(&self) -> &Arc<ServiceContainer> {
    &self.container
  }

  /// Execute a graph once with a fresh context.
  ///
  /// Failures are reported in the result, never panicked or retried.
  /// Validation and ordering failures return before any node executes.
  pub async fn execute(
    &self,
    graph: &NodeGraph,
    variables: Map<String, Value>,
  ) -> GraphExecutionResult {
    let started = Instant::now();
    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(
      execution_id = %execution_id,
      workflow_id = %graph.id,
      workflow_name = %graph.name,
      "workflow_started"
    );

    if let Err(e) = self.validate(graph) {
      error!(execution_id = %execution_id, error = %e, "workflow_rejected");
      return failure_result(graph, e, started);
    }

    let mut nodes = match self.build_nodes(graph) {
      Ok(nodes) => nodes,
      Err(e) => {
        error!(execution_id = %execution_id, error = %e, "workflow_build_failed");
        return failure_result(graph, e, started);
      }
    };

    let mut context = ExecutionContext::new(self.container.clone(), variables);
    let result = self
      .run(
        graph,
        &mut nodes,
        &mut context,
        &HashSet::new(),
        &execution_id,
        started,
      )
      .await;

    if result.success {
      info!(
        execution_id = %execution_id,
        nodes_executed = result.node_results.len(),
        "workflow_completed"
      );
    } else {
      error!(
        execution_id = %execution_id,
        error = result.error.as_deref().unwrap_or("unknown"),
        "workflow_failed"
      );
    }

    result
  }

  /// Execute a (typically derived) graph against live node instances and a
  /// live context.
  ///
  /// Used by the runner for per-tick sub-graph passes. Node ids in
  /// `presatisfied` (autonomous nodes whose outputs for this tick already
  /// sit in the context) participate in ordering and connection
  /// resolution but are not invoked.
  pub async fn execute_with(
    &self,
    graph: &NodeGraph,
    nodes: &mut HashMap<String, Box<dyn Node>>,
    context: &mut ExecutionContext,
    presatisfied: &HashSet<String>,
  ) -> GraphExecutionResult {
    let started = Instant::now();
    let execution_id = uuid::Uuid::new_v4().to_string();

    debug!(
      execution_id = %execution_id,
      workflow_id = %graph.id,
      node_count = graph.nodes.len(),
      "subgraph_started"
    );

    self
      .run(graph, nodes, context, presatisfied, &execution_id, started)
      .await
  }

  /// Build and initialize node instances for every node in the graph.
  pub fn build_nodes(
    &self,
    graph: &NodeGraph,
  ) -> Result<HashMap<String, Box<dyn Node>>, EngineError> {
    let mut nodes: HashMap<String, Box<dyn Node>> = HashMap::with_capacity(graph.nodes.len());

    for spec in &graph.nodes {
      let ctor = self
        .registry
        .lookup(&spec.node_type)
        .ok_or_else(|| EngineError::UnknownNodeType {
          node_id: spec.id.clone(),
          node_type: spec.node_type.clone(),
        })?;
      let node = ctor(spec).map_err(|source| EngineError::Build {
        node_id: spec.id.clone(),
        source,
      })?;
      nodes.insert(spec.id.clone(), node);
    }

    // Second pass: every instance exists, nodes may inspect the graph.
    for spec in &graph.nodes {
      if let Some(node) = nodes.get_mut(&spec.id) {
        node
          .initialize(graph)
          .map_err(|source| EngineError::Build {
            node_id: spec.id.clone(),
            source,
          })?;
      }
    }

    Ok(nodes)
  }

  /// Validate graph structure and node-type registration.
  fn validate(&self, graph: &NodeGraph) -> Result<(), EngineError> {
    graph.validate()?;

    for spec in &graph.nodes {
      if !self.registry.contains(&spec.node_type) {
        return Err(EngineError::UnknownNodeType {
          node_id: spec.id.clone(),
          node_type: spec.node_type.clone(),
        });
      }
    }

    Ok(())
  }

  /// Order and execute the graph against the given nodes and context.
  async fn run(
    &self,
    graph: &NodeGraph,
    nodes: &mut HashMap<String, Box<dyn Node>>,
    context: &mut ExecutionContext,
    presatisfied: &HashSet<String>,
    execution_id: &str,
    started: Instant,
  ) -> GraphExecutionResult {
    let order = match graph.graph().topo_order() {
      Ok(order) => order,
      Err(cycle) => {
        let e = EngineError::from(cycle);
        error!(execution_id = %execution_id, error = %e, "workflow_rejected");
        return failure_result(graph, e, started);
      }
    };

    let mut node_results: Vec<NodeExecutionResult> = Vec::with_capacity(order.len());
    let mut failure: Option<EngineError> = None;

    for node_id in &order {
      if presatisfied.contains(node_id.as_str()) {
        continue;
      }
      let Some(spec) = graph.node(node_id) else {
        continue;
      };
      let Some(node) = nodes.get_mut(node_id) else {
        debug!(execution_id = %execution_id, node_id = %node_id, "no instance for node, skipping");
        continue;
      };

      let resolved = resolve_node_inputs(spec, graph, context);
      let node_started = Instant::now();

      match node.execute(&resolved, context).await {
        Ok(outputs) => {
          let execution_time = node_started.elapsed().as_secs_f64();
          debug!(
            execution_id = %execution_id,
            node_id = %node_id,
            node_type = %spec.node_type,
            elapsed_s = execution_time,
            "node_completed"
          );
          context.node_outputs.insert(node_id.clone(), outputs.clone());
          node_results.push(NodeExecutionResult {
            node_id: node_id.clone(),
            success: true,
            outputs,
            error: None,
            execution_time,
          });
        }
        Err(e) => {
          let execution_time = node_started.elapsed().as_secs_f64();
          error!(
            execution_id = %execution_id,
            node_id = %node_id,
            node_type = %spec.node_type,
            error = %e,
            "node_failed"
          );
          node_results.push(NodeExecutionResult {
            node_id: node_id.clone(),
            success: false,
            outputs: Map::new(),
            error: Some(e.to_string()),
            execution_time,
          });
          failure = Some(EngineError::NodeFailure {
            node_id: node_id.clone(),
            node_type: spec.node_type.clone(),
            source: e,
          });
          break;
        }
      }
    }

    let final_outputs = collect_final_outputs(&order, nodes, context);

    GraphExecutionResult {
      graph_id: graph.id.clone(),
      success: failure.is_none(),
      node_results,
      final_outputs,
      error: failure.as_ref().map(|e| e.to_string()),
      error_kind: failure.as_ref().map(EngineError::kind),
      total_execution_time: started.elapsed().as_secs_f64(),
      execution_order: order,
    }
  }
}

/// Merge outputs of terminal output nodes, in execution order.
fn collect_final_outputs(
  order: &[String],
  nodes: &HashMap<String, Box<dyn Node>>,
  context: &ExecutionContext,
) -> Map<String, Value> {
  let mut final_outputs = Map::new();

  for node_id in order {
    let Some(node) = nodes.get(node_id) else {
      continue;
    };
    if !node.is_terminal_output() {
      continue;
    }
    if let Some(outputs) = context.node_outputs.get(node_id) {
      for (name, value) in outputs {
        final_outputs.insert(name.clone(), value.clone());
      }
    }
  }

  final_outputs
}

fn failure_result(
  graph: &NodeGraph,
  error: EngineError,
  started: Instant,
) -> GraphExecutionResult {
  GraphExecutionResult {
    graph_id: graph.id.clone(),
    success: false,
    node_results: Vec::new(),
    final_outputs: Map::new(),
    error: Some(error.to_string()),
    error_kind: Some(error.kind()),
    total_execution_time: started.elapsed().as_secs_f64(),
    execution_order: Vec::new(),
  }
}
