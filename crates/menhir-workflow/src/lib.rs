//! Menhir Workflow
//!
//! Graph model for node-based workflows. A workflow is a directed graph of
//! typed nodes joined by named connections. This crate holds the
//! engine-facing [`NodeGraph`] representation, the caller-facing
//! [`WorkflowDoc`] JSON shape and its translation, and the [`Graph`]
//! traversal structure used for topological ordering and sub-graph
//! derivation.

mod doc;
mod error;
mod graph;
mod node;

pub use doc::{DocConnection, DocNode, WorkflowDoc};
pub use error::WorkflowError;
pub use graph::{Graph, NodeGraph};
pub use node::{Connection, NodeSpec, Position};
