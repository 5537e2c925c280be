use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("workflow graph has no nodes")]
  EmptyGraph,

  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("connection '{connection_id}' references unknown node '{node_id}'")]
  UnknownEndpoint {
    connection_id: String,
    node_id: String,
  },

  #[error(
    "cycle detected in workflow graph: {ordered}/{total} nodes in execution order, \
     nodes not reached: {unreached:?}"
  )]
  Cycle {
    ordered: usize,
    total: usize,
    unreached: Vec<String>,
  },
}
