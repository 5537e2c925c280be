//! Menhir Node
//!
//! The node contract: what a computation unit looks like to the execution
//! engine and the workflow runner. A node is constructed once per workflow
//! activation from its [`menhir_workflow::NodeSpec`], optionally initialized
//! after the whole graph is built, and then executed: once for one-shot
//! graphs, many times for continuous ones. Autonomous nodes additionally
//! expose `on_tick`, polled by the runner.

mod context;
mod error;
mod inputs;
mod node;
mod registry;
mod template;

pub use context::{ExecutionContext, ServiceContainer};
pub use error::NodeError;
pub use inputs::ResolvedInputs;
pub use node::{ExecutionMode, Node, Outputs};
pub use registry::{NodeCtor, NodeRegistry};
pub use template::{is_template, template_var};
