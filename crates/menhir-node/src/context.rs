use std::collections::HashMap;
use std::sync::Arc;

use menhir_host::{GenerationModel, QuantumRng, Storage};
use serde_json::{Map, Value};

use crate::error::NodeError;
use crate::node::Outputs;

/// Handles to the external collaborators nodes may call out to.
///
/// Everything is optional except the HTTP client; nodes that need an absent
/// collaborator fail with a descriptive error instead of panicking.
#[derive(Clone)]
pub struct ServiceContainer {
  pub model: Option<Arc<dyn GenerationModel>>,
  pub storage: Option<Arc<dyn Storage>>,
  pub quantum: Option<Arc<dyn QuantumRng>>,
  pub http: reqwest::Client,
}

impl Default for ServiceContainer {
  fn default() -> Self {
    Self {
      model: None,
      storage: None,
      quantum: None,
      http: reqwest::Client::new(),
    }
  }
}

impl ServiceContainer {
  /// A container with no collaborators attached.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn model(&self) -> Result<Arc<dyn GenerationModel>, NodeError> {
    self
      .model
      .clone()
      .ok_or_else(|| NodeError::unavailable("no generation model configured"))
  }

  pub fn storage(&self) -> Result<Arc<dyn Storage>, NodeError> {
    self
      .storage
      .clone()
      .ok_or_else(|| NodeError::unavailable("no storage configured"))
  }

  pub fn quantum(&self) -> Result<Arc<dyn QuantumRng>, NodeError> {
    self
      .quantum
      .clone()
      .ok_or_else(|| NodeError::unavailable("no quantum rng configured"))
  }
}

/// Per-activation runtime state shared by all nodes of a workflow.
///
/// One-shot executions create and discard a context; continuous workflows
/// keep one alive for the workflow's lifetime. `node_outputs` is written by
/// the executing loop only; nodes read upstream values from it and must
/// treat it as read-only.
pub struct ExecutionContext {
  pub container: Arc<ServiceContainer>,
  pub variables: Map<String, Value>,
  pub node_outputs: HashMap<String, Outputs>,
}

impl ExecutionContext {
  pub fn new(container: Arc<ServiceContainer>, variables: Map<String, Value>) -> Self {
    Self {
      container,
      variables,
      node_outputs: HashMap::new(),
    }
  }

  /// Look up a caller-seeded variable.
  pub fn variable(&self, name: &str) -> Option<&Value> {
    self.variables.get(name)
  }

  /// Look up one output of an upstream node.
  pub fn output(&self, node_id: &str, output: &str) -> Option<&Value> {
    self.node_outputs.get(node_id)?.get(output)
  }
}
