//! External poll listener node.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use menhir_host::get_json;
use menhir_node::{ExecutionContext, ExecutionMode, Node, NodeError, Outputs, ResolvedInputs};
use menhir_workflow::NodeSpec;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::unix_now;

/// Autonomous node that polls an external endpoint and fires on change.
///
/// Configuration from metadata: `url` (required for the node to do
/// anything), `poll_interval` seconds between polls, `timeout` seconds per
/// request. The first successful poll establishes a baseline without
/// firing, so stale events present at startup are skipped. Poll failures
/// are logged and swallowed; the listener keeps polling.
pub struct PollListenerNode {
  node_id: String,
  url: String,
  poll_interval: f64,
  timeout: Duration,
  last_poll: Option<Instant>,
  last_body: Option<Value>,
  event_count: u64,
}

impl PollListenerNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    Self {
      node_id: spec.id.clone(),
      url: spec.metadata_str("url", ""),
      poll_interval: spec.metadata_f64("poll_interval", 2.0),
      timeout: Duration::from_secs_f64(spec.metadata_f64("timeout", 10.0)),
      last_poll: None,
      last_body: None,
      event_count: 0,
    }
  }
}

#[async_trait]
impl Node for PollListenerNode {
  fn execution_mode(&self) -> ExecutionMode {
    ExecutionMode::Continuous
  }

  async fn execute(
    &mut self,
    _inputs: &ResolvedInputs,
    _ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let mut outputs = Map::new();
    outputs.insert("trigger".to_string(), json!(false));
    outputs.insert("listening".to_string(), json!(!self.url.is_empty()));
    outputs.insert("event_count".to_string(), json!(self.event_count));
    Ok(outputs)
  }

  async fn on_tick(&mut self, ctx: &ExecutionContext) -> Result<Option<Outputs>, NodeError> {
    if self.url.is_empty() {
      return Ok(None);
    }

    if let Some(last) = self.last_poll {
      if last.elapsed().as_secs_f64() < self.poll_interval {
        return Ok(None);
      }
    }
    self.last_poll = Some(Instant::now());

    let body = match get_json(&ctx.container.http, &self.url, self.timeout).await {
      Ok(body) => body,
      Err(e) => {
        warn!(node_id = %self.node_id, error = %e, "poll_failed");
        return Ok(None);
      }
    };

    // First successful poll is the baseline, not an event.
    if self.last_body.is_none() {
      debug!(node_id = %self.node_id, "poll_baseline_established");
      self.last_body = Some(body);
      return Ok(None);
    }

    if self.last_body.as_ref() == Some(&body) {
      return Ok(None);
    }

    self.last_body = Some(body.clone());
    self.event_count += 1;

    debug!(
      node_id = %self.node_id,
      event_count = self.event_count,
      "listener_fired"
    );

    let mut outputs = Map::new();
    outputs.insert("trigger".to_string(), json!(true));
    outputs.insert("body".to_string(), body);
    outputs.insert("event_count".to_string(), json!(self.event_count));
    outputs.insert("timestamp".to_string(), json!(unix_now()));
    Ok(Some(outputs))
  }
}
