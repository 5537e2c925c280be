use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::node::{Connection, NodeSpec};

/// The engine-facing workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGraph {
  pub id: String,
  pub name: String,
  pub nodes: Vec<NodeSpec>,
  #[serde(default)]
  pub connections: Vec<Connection>,
}

impl NodeGraph {
  /// Get a node definition by id.
  pub fn node(&self, node_id: &str) -> Option<&NodeSpec> {
    self.nodes.iter().find(|n| n.id == node_id)
  }

  /// Build the traversal structure for this graph.
  pub fn graph(&self) -> Graph {
    Graph::new(self)
  }

  /// Connections whose target is the given node, in definition order.
  pub fn connections_into<'a>(
    &'a self,
    node_id: &'a str,
  ) -> impl Iterator<Item = &'a Connection> + 'a {
    self
      .connections
      .iter()
      .filter(move |c| c.target_node == node_id)
  }

  /// Check structural invariants: non-empty node list, unique node ids,
  /// every connection endpoint resolves.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    if self.nodes.is_empty() {
      return Err(WorkflowError::EmptyGraph);
    }

    let mut ids = HashSet::with_capacity(self.nodes.len());
    for node in &self.nodes {
      if !ids.insert(node.id.as_str()) {
        return Err(WorkflowError::DuplicateNode(node.id.clone()));
      }
    }

    for conn in &self.connections {
      for endpoint in [&conn.source_node, &conn.target_node] {
        if !ids.contains(endpoint.as_str()) {
          return Err(WorkflowError::UnknownEndpoint {
            connection_id: conn.id.clone(),
            node_id: endpoint.clone(),
          });
        }
      }
    }

    Ok(())
  }

  /// Build a derived graph restricted to `keep`. Connections are retained
  /// only when both endpoints survive.
  pub fn subgraph(&self, keep: &HashSet<String>) -> NodeGraph {
    NodeGraph {
      id: self.id.clone(),
      name: self.name.clone(),
      nodes: self
        .nodes
        .iter()
        .filter(|n| keep.contains(&n.id))
        .cloned()
        .collect(),
      connections: self
        .connections
        .iter()
        .filter(|c| keep.contains(&c.source_node) && keep.contains(&c.target_node))
        .cloned()
        .collect(),
    }
  }
}

/// Graph structure for traversal and analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Node ids in definition order. Topological ties break on this order.
  order: Vec<String>,
  /// Adjacency list: node_id -> downstream node_ids (unique, stable order).
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> upstream node_ids (unique, stable order).
  reverse: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build the traversal structure from a graph definition.
  ///
  /// Parallel connections between the same node pair (different ports)
  /// collapse to a single edge for ordering purposes.
  pub fn new(graph: &NodeGraph) -> Self {
    let order: Vec<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
    for id in &order {
      adjacency.entry(id.clone()).or_default();
      reverse.entry(id.clone()).or_default();
    }

    for conn in &graph.connections {
      let down = adjacency.entry(conn.source_node.clone()).or_default();
      if !down.contains(&conn.target_node) {
        down.push(conn.target_node.clone());
      }
      let up = reverse.entry(conn.target_node.clone()).or_default();
      if !up.contains(&conn.source_node) {
        up.push(conn.source_node.clone());
      }
    }

    Self {
      order,
      adjacency,
      reverse,
    }
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Resolve a topological execution order using Kahn's algorithm.
  ///
  /// The ready queue is seeded and extended in node definition order, so the
  /// result is deterministic for equivalent inputs. If the order covers
  /// fewer nodes than the graph holds, the remainder form a cycle.
  pub fn topo_order(&self) -> Result<Vec<String>, WorkflowError> {
    let mut in_degree: HashMap<&str, usize> = self
      .order
      .iter()
      .map(|id| (id.as_str(), self.upstream(id).len()))
      .collect();

    let mut queue: VecDeque<&str> = self
      .order
      .iter()
      .map(String::as_str)
      .filter(|id| in_degree[id] == 0)
      .collect();

    let mut execution_order = Vec::with_capacity(self.order.len());

    while let Some(node_id) = queue.pop_front() {
      execution_order.push(node_id.to_string());

      for target in self.downstream(node_id) {
        let Some(degree) = in_degree.get_mut(target.as_str()) else {
          continue;
        };
        *degree -= 1;
        if *degree == 0 {
          queue.push_back(target.as_str());
        }
      }
    }

    if execution_order.len() != self.order.len() {
      let ordered: HashSet<&str> = execution_order.iter().map(String::as_str).collect();
      let unreached: Vec<String> = self
        .order
        .iter()
        .filter(|id| !ordered.contains(id.as_str()))
        .cloned()
        .collect();
      return Err(WorkflowError::Cycle {
        ordered: execution_order.len(),
        total: self.order.len(),
        unreached,
      });
    }

    Ok(execution_order)
  }

  /// All nodes reachable from `seeds` over forward edges, seeds included.
  pub fn downstream_closure<I, S>(&self, seeds: I) -> HashSet<String>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut closure: HashSet<String> = seeds.into_iter().map(Into::into).collect();
    let mut queue: VecDeque<String> = closure.iter().cloned().collect();

    while let Some(node_id) = queue.pop_front() {
      for target in self.downstream(&node_id) {
        if closure.insert(target.clone()) {
          queue.push_back(target.clone());
        }
      }
    }

    closure
  }
}
