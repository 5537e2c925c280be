//! Text plumbing nodes.

use async_trait::async_trait;
use menhir_node::{ExecutionContext, Node, NodeError, Outputs, ResolvedInputs};
use serde_json::{Map, Value, json};

/// Flexible text node, usable as input or passthrough.
///
/// Emits the `text` input when resolved; an unresolved template is emitted
/// verbatim, matching the exact-match template rule.
pub struct TextNode;

#[async_trait]
impl Node for TextNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    _ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let text = inputs
      .string("text")
      .or_else(|| {
        inputs
          .raw("text")
          .and_then(Value::as_str)
          .map(str::to_string)
      })
      .unwrap_or_default();

    let mut outputs = Map::new();
    outputs.insert("text".to_string(), json!(text));
    Ok(outputs)
  }
}

/// Entry point for the user's query.
pub struct InputPromptNode;

#[async_trait]
impl Node for InputPromptNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    _ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let prompt = inputs.string_or("prompt", "");

    let mut outputs = Map::new();
    outputs.insert("text".to_string(), json!(prompt));
    Ok(outputs)
  }
}

/// Terminal node whose outputs form the graph's final output projection.
pub struct OutputTextNode;

#[async_trait]
impl Node for OutputTextNode {
  fn is_terminal_output(&self) -> bool {
    true
  }

  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    _ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let response = inputs.string_or("response", "");

    let mut outputs = Map::new();
    outputs.insert("text".to_string(), json!(response));
    Ok(outputs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use menhir_node::ServiceContainer;
  use std::sync::Arc;

  fn ctx() -> ExecutionContext {
    ExecutionContext::new(Arc::new(ServiceContainer::empty()), Map::new())
  }

  fn inputs(value: Value) -> ResolvedInputs {
    match value {
      Value::Object(map) => ResolvedInputs::from_map(map),
      _ => unreachable!(),
    }
  }

  #[tokio::test]
  async fn text_prefers_resolved_input() {
    let out = TextNode
      .execute(&inputs(json!({"text": "hello"})), &ctx())
      .await
      .unwrap();
    assert_eq!(out["text"], json!("hello"));
  }

  #[tokio::test]
  async fn text_emits_unresolved_template_verbatim() {
    let out = TextNode
      .execute(&inputs(json!({"text": "{{missing}}"})), &ctx())
      .await
      .unwrap();
    assert_eq!(out["text"], json!("{{missing}}"));
  }

  #[tokio::test]
  async fn prompt_defaults_to_empty() {
    let out = InputPromptNode
      .execute(&inputs(json!({})), &ctx())
      .await
      .unwrap();
    assert_eq!(out["text"], json!(""));
  }

  #[tokio::test]
  async fn output_text_is_terminal() {
    assert!(OutputTextNode.is_terminal_output());
    let out = OutputTextNode
      .execute(&inputs(json!({"response": "done"})), &ctx())
      .await
      .unwrap();
    assert_eq!(out["text"], json!("done"));
  }
}
