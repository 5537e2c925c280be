//! Caller-facing workflow document.
//!
//! External callers submit workflows with `from`/`from_output`/`to`/
//! `to_input` connections; the engine works on [`NodeGraph`] with
//! `source_node`/`source_output`/`target_node`/`target_input` and synthetic
//! connection ids. Translation happens once at the boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::graph::NodeGraph;
use crate::node::{Connection, NodeSpec, Position};

/// Caller-facing workflow document shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDoc {
  #[serde(default = "default_id")]
  pub id: String,
  #[serde(default = "default_name")]
  pub name: String,
  #[serde(default)]
  pub nodes: Vec<DocNode>,
  #[serde(default)]
  pub connections: Vec<DocConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocNode {
  pub id: String,
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default)]
  pub position: Position,
  #[serde(default)]
  pub inputs: Map<String, Value>,
  #[serde(default)]
  pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocConnection {
  pub from: String,
  #[serde(default = "default_port")]
  pub from_output: String,
  pub to: String,
  #[serde(default = "default_port")]
  pub to_input: String,
}

fn default_id() -> String {
  "workflow".to_string()
}

fn default_name() -> String {
  "Workflow".to_string()
}

fn default_port() -> String {
  "default".to_string()
}

impl WorkflowDoc {
  /// Translate into the engine-facing graph, synthesizing connection ids.
  pub fn into_graph(self) -> NodeGraph {
    let nodes = self
      .nodes
      .into_iter()
      .map(|n| NodeSpec {
        id: n.id,
        node_type: n.node_type,
        position: n.position,
        inputs: n.inputs,
        metadata: n.metadata,
      })
      .collect();

    let connections = self
      .connections
      .into_iter()
      .enumerate()
      .map(|(i, c)| Connection {
        id: format!("conn-{i}"),
        source_node: c.from,
        source_output: c.from_output,
        target_node: c.to,
        target_input: c.to_input,
        data_type: "string".to_string(),
      })
      .collect();

    NodeGraph {
      id: self.id,
      name: self.name,
      nodes,
      connections,
    }
  }
}
