use menhir_node::NodeError;
use menhir_workflow::WorkflowError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine tag attached to failed graph results so callers can distinguish
/// failure classes without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  EmptyGraph,
  InvalidGraph,
  BadConnection,
  UnknownNodeType,
  Cycle,
  NodeFailure,
}

/// Errors produced while validating, building, or executing a graph.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Graph(#[from] WorkflowError),

  #[error("unknown node type '{node_type}' for node '{node_id}'")]
  UnknownNodeType { node_id: String, node_type: String },

  #[error("failed to build node '{node_id}': {source}")]
  Build {
    node_id: String,
    #[source]
    source: NodeError,
  },

  #[error("node '{node_id}' ({node_type}) failed: {source}")]
  NodeFailure {
    node_id: String,
    node_type: String,
    #[source]
    source: NodeError,
  },
}

impl EngineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      EngineError::Graph(WorkflowError::EmptyGraph) => ErrorKind::EmptyGraph,
      EngineError::Graph(WorkflowError::DuplicateNode(_)) => ErrorKind::InvalidGraph,
      EngineError::Graph(WorkflowError::UnknownEndpoint { .. }) => ErrorKind::BadConnection,
      EngineError::Graph(WorkflowError::Cycle { .. }) => ErrorKind::Cycle,
      EngineError::UnknownNodeType { .. } => ErrorKind::UnknownNodeType,
      EngineError::Build { .. } => ErrorKind::InvalidGraph,
      EngineError::NodeFailure { .. } => ErrorKind::NodeFailure,
    }
  }
}
