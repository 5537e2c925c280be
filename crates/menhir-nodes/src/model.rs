//! Model-facing nodes.
//!
//! The shared model travels through the service container, never through
//! node outputs; `model_loader` degrades to a readiness check plus name
//! report, and `sampler` pulls the container model directly.

use async_trait::async_trait;
use menhir_host::{ChatMessage, GenerationRequest};
use menhir_node::{ExecutionContext, Node, NodeError, Outputs, ResolvedInputs};
use menhir_workflow::NodeSpec;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Asserts the container model is present and reports it.
pub struct ModelLoaderNode;

#[async_trait]
impl Node for ModelLoaderNode {
  async fn execute(
    &mut self,
    _inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let model = ctx.container.model()?;

    let mut outputs = Map::new();
    outputs.insert("model".to_string(), json!(model.name()));
    outputs.insert("ready".to_string(), json!(true));
    Ok(outputs)
  }
}

/// Generates a model response from a query, system prompt, and optional
/// conversation context.
pub struct SamplerNode {
  node_id: String,
}

impl SamplerNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    Self {
      node_id: spec.id.clone(),
    }
  }
}

#[async_trait]
impl Node for SamplerNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let model = ctx.container.model()?;

    let query = inputs
      .string("query")
      .filter(|q| !q.trim().is_empty())
      .ok_or_else(|| {
        NodeError::invalid_input("query", "a non-empty query is required")
      })?;

    let mut system_prompt = inputs.string_or("system_prompt", "");
    let mut conversation_history: Option<Vec<ChatMessage>> = None;

    // Conversation context from a memory adapter: {messages, memories}.
    if let Some(context_value) = inputs.value("context") {
      if let Some(memories) = context_value.get("memories").and_then(Value::as_str) {
        if !memories.is_empty() {
          system_prompt = if system_prompt.is_empty() {
            memories.to_string()
          } else {
            format!("{system_prompt}\n\n{memories}")
          };
        }
      }
      if let Some(messages) = context_value.get("messages") {
        conversation_history = serde_json::from_value(messages.clone()).ok();
      }
    }

    let mut request = GenerationRequest::new(query.clone(), system_prompt);
    request.conversation_history = conversation_history;
    request.enable_thinking = inputs.bool_or("enable_thinking", true);
    request.max_tokens = inputs.u64_or("max_tokens", 1024) as u32;
    request.temperature = inputs.f64_or("temperature", request.temperature);
    request.top_p = inputs.f64_or("top_p", request.top_p);
    request.top_k = inputs.u64_or("top_k", request.top_k as u64) as u32;
    request.repetition_penalty =
      inputs.f64_or("repetition_penalty", request.repetition_penalty);

    debug!(
      node_id = %self.node_id,
      query_len = query.len(),
      "sampler_generate"
    );

    let response = model.generate(request).await?;

    let mut outputs = Map::new();
    outputs.insert("query".to_string(), json!(query));
    outputs.insert("response".to_string(), json!(response.response));
    outputs.insert(
      "thinking_content".to_string(),
      json!(response.thinking_content),
    );
    outputs.insert(
      "result".to_string(),
      serde_json::to_value(&response).unwrap_or(Value::Null),
    );
    Ok(outputs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use menhir_host::{GenerationModel, GenerationResponse, ModelError};
  use menhir_node::ServiceContainer;
  use std::sync::Arc;

  struct EchoModel;

  #[async_trait]
  impl GenerationModel for EchoModel {
    async fn generate(
      &self,
      request: GenerationRequest,
    ) -> Result<GenerationResponse, ModelError> {
      Ok(GenerationResponse {
        response: format!("echo: {}", request.query),
        thinking_content: String::new(),
        model: self.name().to_string(),
        input_tokens: 1,
        output_tokens: 1,
        generation_params: Map::new(),
        source: "test".to_string(),
        error: None,
      })
    }

    fn name(&self) -> &str {
      "echo"
    }
  }

  fn ctx_with_model() -> ExecutionContext {
    let container = ServiceContainer {
      model: Some(Arc::new(EchoModel)),
      ..ServiceContainer::empty()
    };
    ExecutionContext::new(Arc::new(container), Map::new())
  }

  fn sampler() -> SamplerNode {
    SamplerNode {
      node_id: "s1".to_string(),
    }
  }

  fn inputs(value: Value) -> ResolvedInputs {
    match value {
      Value::Object(map) => ResolvedInputs::from_map(map),
      _ => unreachable!(),
    }
  }

  #[tokio::test]
  async fn sampler_generates_through_container_model() {
    let out = sampler()
      .execute(&inputs(json!({"query": "hi", "system_prompt": "sys"})), &ctx_with_model())
      .await
      .unwrap();
    assert_eq!(out["response"], json!("echo: hi"));
    assert_eq!(out["query"], json!("hi"));
  }

  #[tokio::test]
  async fn sampler_requires_query() {
    let err = sampler()
      .execute(&inputs(json!({"query": "  "})), &ctx_with_model())
      .await
      .unwrap_err();
    assert!(matches!(err, NodeError::InvalidInput { .. }));
  }

  #[tokio::test]
  async fn sampler_fails_without_model() {
    let ctx = ExecutionContext::new(Arc::new(ServiceContainer::empty()), Map::new());
    let err = sampler()
      .execute(&inputs(json!({"query": "hi"})), &ctx)
      .await
      .unwrap_err();
    assert!(matches!(err, NodeError::Unavailable { .. }));
  }
}
