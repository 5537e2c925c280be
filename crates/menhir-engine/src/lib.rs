//! Menhir Engine
//!
//! The execution engine validates a workflow graph, builds its node
//! instances, resolves a topological execution order, executes nodes one at
//! a time with per-call input resolution, and collects per-node results
//! plus the terminal-output projection. It never retries, never
//! parallelizes node execution, and never schedules beyond a single pass;
//! everything continuous lives in the workflow runner.

mod engine;
mod error;
mod input;
mod result;

pub use engine::ExecutionEngine;
pub use error::{EngineError, ErrorKind};
pub use input::resolve_node_inputs;
pub use result::{GraphExecutionResult, NodeExecutionResult};
