//! Output sanitization for external consumers.
//!
//! Node outputs are already JSON values, so the only hazard left is
//! unbounded nesting; content past the depth cap is replaced with a
//! placeholder string.

use serde_json::Value;

/// Depth applied to tick results handed to external pollers.
pub(crate) const MAX_SANITIZE_DEPTH: usize = 5;

/// Depth-cap a value for external reporting.
pub fn sanitize(value: &Value, max_depth: usize) -> Value {
  if max_depth == 0 {
    return Value::String("<max depth reached>".to_string());
  }

  match value {
    Value::Array(items) => Value::Array(
      items
        .iter()
        .map(|item| sanitize(item, max_depth - 1))
        .collect(),
    ),
    Value::Object(map) => Value::Object(
      map
        .iter()
        .map(|(key, item)| (key.clone(), sanitize(item, max_depth - 1)))
        .collect(),
    ),
    primitive => primitive.clone(),
  }
}
