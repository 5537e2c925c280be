//! Per-execution input resolution.
//!
//! For each node the engine materializes a [`ResolvedInputs`] view: the
//! node's base inputs, overlaid with connected upstream outputs, with
//! template variables substituted from the context. The base inputs are
//! never mutated; every execution starts from the graph definition again.

use std::collections::HashSet;

use menhir_node::{ExecutionContext, ResolvedInputs, template_var};
use menhir_workflow::{NodeGraph, NodeSpec};

/// Resolve one node's inputs for the current execution.
///
/// Connection values take precedence over literal inputs and templates. An
/// input whose connection has not produced a value yet falls back to its
/// own entry, including template substitution. Templates without a matching
/// context variable are left verbatim for the node's default handling.
pub fn resolve_node_inputs(
  spec: &NodeSpec,
  graph: &NodeGraph,
  context: &ExecutionContext,
) -> ResolvedInputs {
  let mut values = spec.inputs.clone();
  let mut overlaid: HashSet<String> = HashSet::new();

  for conn in graph.connections_into(&spec.id) {
    if let Some(value) = context.output(&conn.source_node, &conn.source_output) {
      values.insert(conn.target_input.clone(), value.clone());
      overlaid.insert(conn.target_input.clone());
    }
  }

  for (name, value) in values.iter_mut() {
    if overlaid.contains(name) {
      continue;
    }
    let Some(var) = template_var(value) else {
      continue;
    };
    if let Some(resolved) = context.variable(var) {
      *value = resolved.clone();
    }
  }

  ResolvedInputs::from_map(values)
}
