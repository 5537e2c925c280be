//! Adapter weight loader node.

use async_trait::async_trait;
use menhir_node::{ExecutionContext, Node, NodeError, Outputs, ResolvedInputs};
use menhir_workflow::NodeSpec;
use serde_json::{Map, json};
use tracing::{debug, warn};

/// Checks storage for fine-tuned adapter weights and reports what it found.
///
/// Applying the weights is the model backend's concern; this node only
/// resolves whether a blob exists under the configured key so downstream
/// nodes (and operators reading tick results) know which weights are in
/// play. A missing blob is not an error: the workflow continues on the
/// base model.
pub struct AdapterLoaderNode {
  node_id: String,
  default_key: String,
}

impl AdapterLoaderNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    Self {
      node_id: spec.id.clone(),
      default_key: spec.metadata_str("adapter_key", "adapter/latest"),
    }
  }
}

#[async_trait]
impl Node for AdapterLoaderNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let enabled = inputs.bool_or("enabled", true);
    let adapter_key = inputs
      .string("adapter_key")
      .filter(|k| !k.is_empty())
      .unwrap_or_else(|| self.default_key.clone());

    let mut outputs = Map::new();
    outputs.insert("adapter_key".to_string(), json!(adapter_key));

    if !enabled {
      outputs.insert("loaded".to_string(), json!(false));
      outputs.insert("size_bytes".to_string(), json!(0));
      return Ok(outputs);
    }

    let storage = ctx.container.storage()?;
    match storage.get_blob(&adapter_key).await {
      Ok(Some(blob)) => {
        debug!(
          node_id = %self.node_id,
          adapter_key = %adapter_key,
          size_bytes = blob.len(),
          "adapter_weights_found"
        );
        outputs.insert("loaded".to_string(), json!(true));
        outputs.insert("size_bytes".to_string(), json!(blob.len()));
      }
      Ok(None) => {
        debug!(node_id = %self.node_id, adapter_key = %adapter_key, "no adapter weights, using base model");
        outputs.insert("loaded".to_string(), json!(false));
        outputs.insert("size_bytes".to_string(), json!(0));
      }
      Err(e) => {
        // Weight lookup failure falls back to the base model.
        warn!(node_id = %self.node_id, error = %e, "adapter lookup failed, continuing without");
        outputs.insert("loaded".to_string(), json!(false));
        outputs.insert("size_bytes".to_string(), json!(0));
      }
    }

    Ok(outputs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use menhir_host::{MemoryStore, Storage};
  use menhir_node::ServiceContainer;
  use serde_json::Value;
  use std::sync::Arc;

  fn node() -> AdapterLoaderNode {
    AdapterLoaderNode {
      node_id: "adapter".to_string(),
      default_key: "adapter/latest".to_string(),
    }
  }

  fn inputs(value: Value) -> ResolvedInputs {
    match value {
      Value::Object(map) => ResolvedInputs::from_map(map),
      _ => unreachable!(),
    }
  }

  #[tokio::test]
  async fn reports_stored_weights() {
    let store = Arc::new(MemoryStore::new());
    store
      .put_blob("adapter/latest", vec![0u8; 64])
      .await
      .unwrap();
    let container = ServiceContainer {
      storage: Some(store),
      ..ServiceContainer::empty()
    };
    let ctx = ExecutionContext::new(Arc::new(container), Map::new());

    let out = node().execute(&inputs(json!({})), &ctx).await.unwrap();
    assert_eq!(out["loaded"], json!(true));
    assert_eq!(out["size_bytes"], json!(64));
  }

  #[tokio::test]
  async fn missing_weights_fall_back_to_base_model() {
    let container = ServiceContainer {
      storage: Some(Arc::new(MemoryStore::new())),
      ..ServiceContainer::empty()
    };
    let ctx = ExecutionContext::new(Arc::new(container), Map::new());

    let out = node().execute(&inputs(json!({})), &ctx).await.unwrap();
    assert_eq!(out["loaded"], json!(false));
  }

  #[tokio::test]
  async fn disabled_loader_skips_storage() {
    // No storage configured: the disabled path must not need it.
    let ctx = ExecutionContext::new(Arc::new(ServiceContainer::empty()), Map::new());
    let out = node()
      .execute(&inputs(json!({"enabled": false})), &ctx)
      .await
      .unwrap();
    assert_eq!(out["loaded"], json!(false));
  }
}
