//! Outbound HTTP node.

use std::time::Duration;

use async_trait::async_trait;
use menhir_host::{get_json, post_json};
use menhir_node::{ExecutionContext, Node, NodeError, Outputs, ResolvedInputs};
use menhir_workflow::NodeSpec;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Best-effort GET/POST against an external service.
///
/// Network failures surface as node failures with the transport's message.
pub struct HttpRequestNode {
  node_id: String,
  default_url: String,
}

impl HttpRequestNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    Self {
      node_id: spec.id.clone(),
      default_url: spec.metadata_str("url", ""),
    }
  }
}

#[async_trait]
impl Node for HttpRequestNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let url = inputs
      .string("url")
      .filter(|u| !u.is_empty())
      .unwrap_or_else(|| self.default_url.clone());
    if url.is_empty() {
      return Err(NodeError::missing_input("url"));
    }

    let method = inputs.string_or("method", "POST").to_uppercase();
    let timeout = Duration::from_secs_f64(inputs.f64_or("timeout", 10.0));

    debug!(node_id = %self.node_id, method = %method, url = %url, "http_request");

    let response = match method.as_str() {
      "GET" => get_json(&ctx.container.http, &url, timeout).await?,
      "POST" => {
        let body = inputs.value("body").cloned().unwrap_or(Value::Object(Map::new()));
        post_json(&ctx.container.http, &url, &body, timeout).await?
      }
      other => {
        return Err(NodeError::invalid_input(
          "method",
          format!("unsupported method '{other}'"),
        ));
      }
    };

    let mut outputs = Map::new();
    outputs.insert("success".to_string(), json!(true));
    outputs.insert("response".to_string(), response);
    Ok(outputs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use menhir_node::ServiceContainer;
  use std::sync::Arc;

  fn node() -> HttpRequestNode {
    HttpRequestNode {
      node_id: "http".to_string(),
      default_url: String::new(),
    }
  }

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
  async fn missing_url_is_rejected() {
    let err = node().execute(&inputs(json!({})), &ctx()).await.unwrap_err();
    assert!(matches!(err, NodeError::MissingInput { .. }));
  }

  #[tokio::test]
  async fn unsupported_method_is_rejected() {
    let err = node()
      .execute(
        &inputs(json!({"url": "http://localhost:1", "method": "DELETE"})),
        &ctx(),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, NodeError::InvalidInput { .. }));
  }
}
