//! Quantum RNG contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One sample from the quantum backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumSample {
  /// Normalized sample in `[0, 1]`.
  pub value: f64,
  /// Backend-specific metadata (counts, backend name, circuit depth, …).
  #[serde(default)]
  pub metadata: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum RngError {
  #[error("quantum backend unavailable: {message}")]
  Unavailable { message: String },

  #[error("quantum sampling failed: {message}")]
  Sampling { message: String },
}

/// Quantum random number service.
#[async_trait]
pub trait QuantumRng: Send + Sync {
  /// Run a sampling circuit and return a normalized value.
  async fn quantum_random(&self, num_qubits: u32, shots: u32) -> Result<QuantumSample, RngError>;
}
