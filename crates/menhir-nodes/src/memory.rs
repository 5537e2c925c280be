//! Storage-facing nodes.

use async_trait::async_trait;
use menhir_node::{ExecutionContext, Node, NodeError, Outputs, ResolvedInputs};
use menhir_workflow::NodeSpec;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::unix_now;

/// Produces conversation context from recent stored interactions.
///
/// Without an explicit `user_id`, each adapter keys its memory off its own
/// node id so two adapters in one graph never share history by accident.
pub struct MemoryAdapterNode {
  node_id: String,
}

impl MemoryAdapterNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    Self {
      node_id: spec.id.clone(),
    }
  }
}

#[async_trait]
impl Node for MemoryAdapterNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let storage = ctx.container.storage()?;

    let user_id = inputs
      .string("user_id")
      .filter(|id| !id.is_empty())
      .unwrap_or_else(|| format!("adapter_{}", self.node_id));
    let limit = inputs.u64_or("limit", 10) as usize;

    let interactions = storage.recent_interactions(&user_id, limit).await?;

    let mut messages = Vec::with_capacity(interactions.len() * 2);
    for interaction in &interactions {
      if let Some(query) = interaction.get("query").and_then(Value::as_str) {
        messages.push(json!({"role": "user", "content": query}));
      }
      if let Some(response) = interaction.get("response").and_then(Value::as_str) {
        messages.push(json!({"role": "assistant", "content": response}));
      }
    }

    debug!(
      node_id = %self.node_id,
      user_id = %user_id,
      message_count = messages.len(),
      "memory_context_built"
    );

    let mut outputs = Map::new();
    outputs.insert("context".to_string(), json!({ "messages": messages }));
    outputs.insert("user_id".to_string(), json!(user_id));
    Ok(outputs)
  }
}

/// Persists an interaction or activity entry through storage.
pub struct SaveNode {
  node_id: String,
}

impl SaveNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    Self {
      node_id: spec.id.clone(),
    }
  }
}

#[async_trait]
impl Node for SaveNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let storage = ctx.container.storage()?;

    let data_type = inputs.string_or("data_type", "interaction");
    let user_id = inputs.string_or("user_id", "anonymous");

    let saved_data = match data_type.as_str() {
      "interaction" => {
        let record = json!({
          "user_id": user_id,
          "query": inputs.string_or("query", ""),
          "response": inputs.string_or("response", ""),
          "timestamp": unix_now(),
        });
        storage.append_interaction(&user_id, record.clone()).await?;
        record
      }
      "activity" | "summary" => {
        let entry = json!({
          "user_id": user_id,
          "kind": data_type,
          "data": inputs.value("data").cloned().unwrap_or(Value::Null),
          "timestamp": unix_now(),
        });
        storage.append_activity(&user_id, entry.clone()).await?;
        entry
      }
      other => {
        return Err(NodeError::invalid_input(
          "data_type",
          format!("unsupported data type '{other}'"),
        ));
      }
    };

    debug!(node_id = %self.node_id, user_id = %user_id, data_type = %data_type, "saved");

    let mut outputs = Map::new();
    outputs.insert("saved".to_string(), json!(true));
    outputs.insert("saved_data".to_string(), saved_data);
    Ok(outputs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use menhir_host::{MemoryStore, Storage};
  use menhir_node::ServiceContainer;
  use std::sync::Arc;

  fn ctx_with_storage() -> (ExecutionContext, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let container = ServiceContainer {
      storage: Some(store.clone()),
      ..ServiceContainer::empty()
    };
    (
      ExecutionContext::new(Arc::new(container), Map::new()),
      store,
    )
  }

  fn inputs(value: Value) -> ResolvedInputs {
    match value {
      Value::Object(map) => ResolvedInputs::from_map(map),
      _ => unreachable!(),
    }
  }

  #[tokio::test]
  async fn save_then_adapt_round_trips_conversation() {
    let (ctx, store) = ctx_with_storage();

    let mut save = SaveNode {
      node_id: "save".to_string(),
    };
    save
      .execute(
        &inputs(json!({"user_id": "u1", "query": "hi", "response": "hello"})),
        &ctx,
      )
      .await
      .unwrap();

    assert_eq!(store.recent_interactions("u1", 10).await.unwrap().len(), 1);

    let mut adapter = MemoryAdapterNode {
      node_id: "mem".to_string(),
    };
    let out = adapter
      .execute(&inputs(json!({"user_id": "u1"})), &ctx)
      .await
      .unwrap();

    let messages = out["context"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], json!("user"));
    assert_eq!(messages[1]["content"], json!("hello"));
  }

  #[tokio::test]
  async fn adapter_defaults_user_to_node_id() {
    let (ctx, _store) = ctx_with_storage();
    let mut adapter = MemoryAdapterNode {
      node_id: "mem".to_string(),
    };
    let out = adapter.execute(&inputs(json!({})), &ctx).await.unwrap();
    assert_eq!(out["user_id"], json!("adapter_mem"));
  }

  #[tokio::test]
  async fn save_rejects_unknown_data_type() {
    let (ctx, _store) = ctx_with_storage();
    let mut save = SaveNode {
      node_id: "save".to_string(),
    };
    let err = save
      .execute(&inputs(json!({"data_type": "bogus"})), &ctx)
      .await
      .unwrap_err();
    assert!(matches!(err, NodeError::InvalidInput { .. }));
  }
}
