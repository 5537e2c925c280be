//! Binary intent classification node.

use async_trait::async_trait;
use menhir_host::GenerationRequest;
use menhir_node::{ExecutionContext, Node, NodeError, Outputs, ResolvedInputs};
use menhir_workflow::NodeSpec;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

/// System prompt pinned by the node so the model reliably emits JSON.
const CLASSIFIER_PROMPT: &str = r#"You are an intent classifier. Your job is to analyze text and determine if it matches the specified criteria.

You MUST respond ONLY with valid JSON in this exact format (no markdown, no extra text):
{
  "result": true,
  "confidence": "high",
  "reasoning": "Brief explanation"
}

Rules:
- "result" must be true or false (boolean, not string)
- "confidence" must be exactly one of: "high", "medium", "low"
- "reasoning" should be 1 brief sentence explaining why

Respond with JSON only. Start with { and end with }."#;

/// Classifies a message against intent criteria into a yes/no decision.
///
/// On a positive result the original message passes through for further
/// processing; on a negative result `message` is empty so downstream
/// branches can stop. Classification problems (missing inputs, unparsable
/// model output) degrade to a low-confidence negative rather than failing
/// the node.
pub struct BinaryIntentNode {
  node_id: String,
  default_criteria: String,
}

impl BinaryIntentNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    Self {
      node_id: spec.id.clone(),
      default_criteria: spec.metadata_str("intent_criteria", ""),
    }
  }
}

fn verdict(result: bool, message: &str, confidence: &str, reasoning: &str) -> Outputs {
  let mut outputs = Map::new();
  outputs.insert("result".to_string(), json!(result));
  outputs.insert(
    "message".to_string(),
    json!(if result { message } else { "" }),
  );
  outputs.insert("confidence".to_string(), json!(confidence));
  outputs.insert("reasoning".to_string(), json!(reasoning));
  outputs
}

/// Pull the first JSON object out of a model response that may carry
/// prose or code fences around it.
fn extract_json(text: &str) -> Option<Value> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  if end < start {
    return None;
  }
  serde_json::from_str(&text[start..=end]).ok()
}

#[async_trait]
impl Node for BinaryIntentNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let message = inputs.string_or("message", "");
    let criteria = inputs
      .string("intent_criteria")
      .filter(|c| !c.is_empty())
      .unwrap_or_else(|| self.default_criteria.clone());
    let additional_context = inputs.string_or("context", "");

    if message.is_empty() {
      warn!(node_id = %self.node_id, "no message to classify");
      return Ok(verdict(false, "", "low", "No message provided to analyze"));
    }
    if criteria.is_empty() {
      warn!(node_id = %self.node_id, "no intent criteria configured");
      return Ok(verdict(false, "", "low", "No intent criteria specified"));
    }

    let model = ctx.container.model()?;

    let mut query = format!("CRITERIA TO CHECK:\n{criteria}");
    if !additional_context.is_empty() {
      query.push_str(&format!("\n\nADDITIONAL CONTEXT:\n{additional_context}"));
    }
    query.push_str(&format!("\n\nMESSAGE TO ANALYZE:\n{message}"));
    query.push_str("\n\nRespond with JSON only:");

    let mut request = GenerationRequest::new(query, CLASSIFIER_PROMPT);
    // Short, deterministic output for a stable verdict.
    request.enable_thinking = false;
    request.max_tokens = 200;
    request.temperature = 0.1;

    let response = model.generate(request).await?;

    let Some(parsed) = extract_json(&response.response) else {
      warn!(
        node_id = %self.node_id,
        response_len = response.response.len(),
        "classification response was not valid JSON"
      );
      return Ok(verdict(
        false,
        "",
        "low",
        "Failed to parse classification response",
      ));
    };

    let result = parsed.get("result").and_then(Value::as_bool).unwrap_or(false);
    let confidence = match parsed.get("confidence").and_then(Value::as_str) {
      Some(c @ ("high" | "medium" | "low")) => c.to_string(),
      _ => "medium".to_string(),
    };
    let reasoning = parsed
      .get("reasoning")
      .and_then(Value::as_str)
      .unwrap_or("No reasoning provided")
      .to_string();

    info!(
      node_id = %self.node_id,
      result,
      confidence = %confidence,
      "intent_classified"
    );

    Ok(verdict(result, &message, &confidence, &reasoning))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use menhir_host::{GenerationModel, GenerationResponse, ModelError};
  use menhir_node::ServiceContainer;
  use std::sync::Arc;

  struct ScriptedModel(String);

  #[async_trait]
  impl GenerationModel for ScriptedModel {
    async fn generate(
      &self,
      _request: GenerationRequest,
    ) -> Result<GenerationResponse, ModelError> {
      Ok(GenerationResponse {
        response: self.0.clone(),
        thinking_content: String::new(),
        model: "scripted".to_string(),
        input_tokens: 0,
        output_tokens: 0,
        generation_params: Map::new(),
        source: "test".to_string(),
        error: None,
      })
    }

    fn name(&self) -> &str {
      "scripted"
    }
  }

  fn node() -> BinaryIntentNode {
    BinaryIntentNode {
      node_id: "intent".to_string(),
      default_criteria: "is the user asking for help".to_string(),
    }
  }

  fn ctx(script: &str) -> ExecutionContext {
    let container = ServiceContainer {
      model: Some(Arc::new(ScriptedModel(script.to_string()))),
      ..ServiceContainer::empty()
    };
    ExecutionContext::new(Arc::new(container), Map::new())
  }

  fn inputs(value: Value) -> ResolvedInputs {
    match value {
      Value::Object(map) => ResolvedInputs::from_map(map),
      _ => unreachable!(),
    }
  }

  #[tokio::test]
  async fn positive_verdict_passes_message_through() {
    let script = r#"{"result": true, "confidence": "high", "reasoning": "clear ask"}"#;
    let out = node()
      .execute(&inputs(json!({"message": "please help me"})), &ctx(script))
      .await
      .unwrap();
    assert_eq!(out["result"], json!(true));
    assert_eq!(out["message"], json!("please help me"));
    assert_eq!(out["confidence"], json!("high"));
  }

  #[tokio::test]
  async fn negative_verdict_empties_the_passthrough() {
    let script = r#"noise before {"result": false, "confidence": "low", "reasoning": "no"} after"#;
    let out = node()
      .execute(&inputs(json!({"message": "just chatting"})), &ctx(script))
      .await
      .unwrap();
    assert_eq!(out["result"], json!(false));
    assert_eq!(out["message"], json!(""));
  }

  #[tokio::test]
  async fn unparsable_response_degrades_to_low_confidence_no() {
    let out = node()
      .execute(&inputs(json!({"message": "hello"})), &ctx("not json at all"))
      .await
      .unwrap();
    assert_eq!(out["result"], json!(false));
    assert_eq!(out["confidence"], json!("low"));
  }

  #[tokio::test]
  async fn missing_message_short_circuits_without_model_call() {
    let out = node()
      .execute(&inputs(json!({})), &ctx("ignored"))
      .await
      .unwrap();
    assert_eq!(out["result"], json!(false));
    assert_eq!(out["reasoning"], json!("No message provided to analyze"));
  }

  #[test]
  fn extract_json_finds_embedded_objects() {
    assert!(extract_json(r#"```json
{"a": 1}
```"#).is_some());
    assert!(extract_json("no braces").is_none());
  }
}
