//! Scheduler node.

use std::time::Instant;

use async_trait::async_trait;
use menhir_node::{ExecutionContext, ExecutionMode, Node, NodeError, Outputs, ResolvedInputs};
use menhir_workflow::NodeSpec;
use rand::Rng;
use serde_json::{Map, json};
use tracing::info;

use crate::unix_now;

/// Autonomous node that fires at random intervals.
///
/// Configuration comes from metadata: `min_seconds` / `max_seconds` bound
/// the interval (swapped if inverted), `enabled` gates firing. `execute`
/// (the one-shot path) arms the timer and reports an idle state; firing
/// happens only through `on_tick`.
pub struct SchedulerNode {
  node_id: String,
  min_seconds: f64,
  max_seconds: f64,
  enabled: bool,
  last_fire: Instant,
  next_interval: f64,
  fire_count: u64,
}

impl SchedulerNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    let mut min_seconds = spec.metadata_f64("min_seconds", 5.0);
    let mut max_seconds = spec.metadata_f64("max_seconds", 10.0);
    if min_seconds > max_seconds {
      std::mem::swap(&mut min_seconds, &mut max_seconds);
    }

    let mut node = Self {
      node_id: spec.id.clone(),
      min_seconds,
      max_seconds,
      enabled: spec.metadata_bool("enabled", true),
      last_fire: Instant::now(),
      next_interval: 0.0,
      fire_count: 0,
    };
    node.next_interval = node.generate_interval();
    node
  }

  fn generate_interval(&self) -> f64 {
    if self.min_seconds >= self.max_seconds {
      return self.min_seconds;
    }
    rand::rng().random_range(self.min_seconds..=self.max_seconds)
  }

  fn status_outputs(&self, trigger: bool) -> Outputs {
    let mut outputs = Map::new();
    outputs.insert("trigger".to_string(), json!(trigger));
    outputs.insert("tick_count".to_string(), json!(self.fire_count));
    outputs.insert("timestamp".to_string(), json!(unix_now()));
    outputs.insert("next_fire_in".to_string(), json!(self.next_interval));
    outputs
  }
}

#[async_trait]
impl Node for SchedulerNode {
  fn execution_mode(&self) -> ExecutionMode {
    ExecutionMode::Continuous
  }

  async fn execute(
    &mut self,
    _inputs: &ResolvedInputs,
    _ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    // Arm the timer; one-shot execution never fires.
    self.last_fire = Instant::now();
    self.next_interval = self.generate_interval();
    Ok(self.status_outputs(false))
  }

  async fn on_tick(&mut self, _ctx: &ExecutionContext) -> Result<Option<Outputs>, NodeError> {
    if !self.enabled {
      return Ok(None);
    }

    let elapsed = self.last_fire.elapsed().as_secs_f64();
    if elapsed < self.next_interval {
      return Ok(None);
    }

    self.fire_count += 1;
    self.last_fire = Instant::now();
    self.next_interval = self.generate_interval();

    info!(
      node_id = %self.node_id,
      fire_count = self.fire_count,
      next_fire_in = self.next_interval,
      "scheduler_fired"
    );

    Ok(Some(self.status_outputs(true)))
  }
}
