use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Layout hint for editors. Never consulted by execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
  pub x: f64,
  pub y: f64,
}

/// A node definition inside a [`crate::NodeGraph`].
///
/// `inputs` holds literal values or template expressions of the exact form
/// `"{{name}}"`. `metadata` is an opaque configuration bag consumed only by
/// the node implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
  pub id: String,
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default)]
  pub position: Position,
  #[serde(default)]
  pub inputs: Map<String, Value>,
  #[serde(default)]
  pub metadata: Map<String, Value>,
}

impl NodeSpec {
  /// String-valued input, if present and a string.
  pub fn input_str(&self, name: &str) -> Option<&str> {
    self.inputs.get(name).and_then(Value::as_str)
  }

  /// f64-valued metadata entry with a default.
  pub fn metadata_f64(&self, name: &str, default: f64) -> f64 {
    self
      .metadata
      .get(name)
      .and_then(Value::as_f64)
      .unwrap_or(default)
  }

  /// u64-valued metadata entry with a default.
  pub fn metadata_u64(&self, name: &str, default: u64) -> u64 {
    self
      .metadata
      .get(name)
      .and_then(Value::as_u64)
      .unwrap_or(default)
  }

  /// bool-valued metadata entry with a default.
  pub fn metadata_bool(&self, name: &str, default: bool) -> bool {
    self
      .metadata
      .get(name)
      .and_then(Value::as_bool)
      .unwrap_or(default)
  }

  /// String-valued metadata entry with a default.
  pub fn metadata_str(&self, name: &str, default: &str) -> String {
    self
      .metadata
      .get(name)
      .and_then(Value::as_str)
      .unwrap_or(default)
      .to_string()
  }
}

/// A directed, named edge between two node ports.
///
/// `data_type` is informational only; values are not coerced on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
  pub id: String,
  pub source_node: String,
  pub source_output: String,
  pub target_node: String,
  pub target_input: String,
  #[serde(default = "default_data_type")]
  pub data_type: String,
}

fn default_data_type() -> String {
  "string".to_string()
}
