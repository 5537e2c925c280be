//! Quantum RNG node.

use async_trait::async_trait;
use menhir_node::{ExecutionContext, Node, NodeError, Outputs, ResolvedInputs};
use menhir_workflow::NodeSpec;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Draws one normalized sample from the quantum backend.
///
/// Backend failure propagates as a node failure; there is no pseudo-random
/// fallback.
pub struct QuantumSamplerNode {
  node_id: String,
}

impl QuantumSamplerNode {
  pub fn from_spec(spec: &NodeSpec) -> Self {
    Self {
      node_id: spec.id.clone(),
    }
  }
}

#[async_trait]
impl Node for QuantumSamplerNode {
  async fn execute(
    &mut self,
    inputs: &ResolvedInputs,
    ctx: &ExecutionContext,
  ) -> Result<Outputs, NodeError> {
    let quantum = ctx.container.quantum()?;

    let num_qubits = inputs.u64_or("num_qubits", 4) as u32;
    let shots = inputs.u64_or("shots", 1) as u32;

    let sample = quantum.quantum_random(num_qubits, shots).await?;

    debug!(
      node_id = %self.node_id,
      num_qubits,
      shots,
      value = sample.value,
      "quantum_sampled"
    );

    let mut outputs = Map::new();
    outputs.insert("value".to_string(), json!(sample.value));
    outputs.insert("metadata".to_string(), Value::Object(sample.metadata));
    Ok(outputs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use menhir_host::{QuantumRng, QuantumSample, RngError};
  use menhir_node::ServiceContainer;
  use std::sync::Arc;

  struct FixedRng(f64);

  #[async_trait]
  impl QuantumRng for FixedRng {
    async fn quantum_random(
      &self,
      _num_qubits: u32,
      _shots: u32,
    ) -> Result<QuantumSample, RngError> {
      Ok(QuantumSample {
        value: self.0,
        metadata: Map::new(),
      })
    }
  }

  struct BrokenRng;

  #[async_trait]
  impl QuantumRng for BrokenRng {
    async fn quantum_random(
      &self,
      _num_qubits: u32,
      _shots: u32,
    ) -> Result<QuantumSample, RngError> {
      Err(RngError::Unavailable {
        message: "backend offline".to_string(),
      })
    }
  }

  fn node() -> QuantumSamplerNode {
    QuantumSamplerNode {
      node_id: "q1".to_string(),
    }
  }

  fn ctx(rng: Arc<dyn QuantumRng>) -> ExecutionContext {
    let container = ServiceContainer {
      quantum: Some(rng),
      ..ServiceContainer::empty()
    };
    ExecutionContext::new(Arc::new(container), Map::new())
  }

  #[tokio::test]
  async fn emits_sample_value() {
    let out = node()
      .execute(
        &ResolvedInputs::default(),
        &ctx(Arc::new(FixedRng(0.42))),
      )
      .await
      .unwrap();
    assert_eq!(out["value"], json!(0.42));
  }

  #[tokio::test]
  async fn backend_failure_fails_the_node() {
    let err = node()
      .execute(&ResolvedInputs::default(), &ctx(Arc::new(BrokenRng)))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("backend offline"));
  }
}
