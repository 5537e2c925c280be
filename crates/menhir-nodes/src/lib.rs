//! Menhir Nodes
//!
//! Built-in node implementations. Everything here is constructed through
//! [`builtin_registry`], which maps the stock node-type tags to their
//! constructors.

mod adapter;
mod http;
mod intent;
mod listener;
mod memory;
mod model;
mod quantum;
mod scheduler;
mod text;

pub use adapter::AdapterLoaderNode;
pub use http::HttpRequestNode;
pub use intent::BinaryIntentNode;
pub use listener::PollListenerNode;
pub use memory::{MemoryAdapterNode, SaveNode};
pub use model::{ModelLoaderNode, SamplerNode};
pub use quantum::QuantumSamplerNode;
pub use scheduler::SchedulerNode;
pub use text::{InputPromptNode, OutputTextNode, TextNode};

use menhir_node::{Node, NodeRegistry};

/// Registry with every built-in node type registered.
pub fn builtin_registry() -> NodeRegistry {
  let mut registry = NodeRegistry::new();

  registry.register("text", |_spec| Ok(Box::new(TextNode) as Box<dyn Node>));
  registry.register("input_prompt", |_spec| {
    Ok(Box::new(InputPromptNode) as Box<dyn Node>)
  });
  registry.register("output_text", |_spec| {
    Ok(Box::new(OutputTextNode) as Box<dyn Node>)
  });
  registry.register("model_loader", |_spec| {
    Ok(Box::new(ModelLoaderNode) as Box<dyn Node>)
  });
  registry.register("sampler", |spec| {
    Ok(Box::new(SamplerNode::from_spec(spec)) as Box<dyn Node>)
  });
  registry.register("memory_adapter", |spec| {
    Ok(Box::new(MemoryAdapterNode::from_spec(spec)) as Box<dyn Node>)
  });
  registry.register("save", |spec| {
    Ok(Box::new(SaveNode::from_spec(spec)) as Box<dyn Node>)
  });
  registry.register("quantum_sampler", |spec| {
    Ok(Box::new(QuantumSamplerNode::from_spec(spec)) as Box<dyn Node>)
  });
  registry.register("scheduler", |spec| {
    Ok(Box::new(SchedulerNode::from_spec(spec)) as Box<dyn Node>)
  });
  registry.register("poll_listener", |spec| {
    Ok(Box::new(PollListenerNode::from_spec(spec)) as Box<dyn Node>)
  });
  registry.register("http_request", |spec| {
    Ok(Box::new(HttpRequestNode::from_spec(spec)) as Box<dyn Node>)
  });
  registry.register("binary_intent", |spec| {
    Ok(Box::new(BinaryIntentNode::from_spec(spec)) as Box<dyn Node>)
  });
  registry.register("adapter_loader", |spec| {
    Ok(Box::new(AdapterLoaderNode::from_spec(spec)) as Box<dyn Node>)
  });

  registry
}

/// Current unix time in seconds, fractional.
pub(crate) fn unix_now() -> f64 {
  chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_tags_are_registered() {
    let registry = builtin_registry();
    for tag in [
      "text",
      "input_prompt",
      "output_text",
      "model_loader",
      "sampler",
      "memory_adapter",
      "save",
      "quantum_sampler",
      "scheduler",
      "poll_listener",
      "http_request",
      "binary_intent",
      "adapter_loader",
    ] {
      assert!(registry.contains(tag), "missing builtin tag {tag}");
    }
  }
}
