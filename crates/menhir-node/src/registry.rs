use std::collections::HashMap;
use std::sync::Arc;

use menhir_workflow::NodeSpec;

use crate::error::NodeError;
use crate::node::Node;

/// Constructor producing a node instance from its graph definition.
///
/// The spec is passed by reference; constructors clone what they keep, so
/// per-execution mutation can never leak back into the graph definition.
pub type NodeCtor = Arc<dyn Fn(&NodeSpec) -> Result<Box<dyn Node>, NodeError> + Send + Sync>;

/// Mapping from node-type tag to constructor.
///
/// Populated at startup and handed to the engine; all registrations
/// complete before the first graph is validated.
#[derive(Clone, Default)]
pub struct NodeRegistry {
  ctors: HashMap<String, NodeCtor>,
}

impl NodeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a constructor for a tag, replacing any prior binding.
  pub fn register<F>(&mut self, tag: impl Into<String>, ctor: F)
  where
    F: Fn(&NodeSpec) -> Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
  {
    self.ctors.insert(tag.into(), Arc::new(ctor));
  }

  /// Look up the constructor for a tag.
  pub fn lookup(&self, tag: &str) -> Option<NodeCtor> {
    self.ctors.get(tag).cloned()
  }

  /// Whether a tag is registered.
  pub fn contains(&self, tag: &str) -> bool {
    self.ctors.contains_key(tag)
  }

  /// Build a node instance for a spec.
  pub fn build(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
    let ctor = self.lookup(&spec.node_type).ok_or_else(|| {
      NodeError::failed(format!("unknown node type '{}'", spec.node_type))
    })?;
    ctor(spec)
  }
}
