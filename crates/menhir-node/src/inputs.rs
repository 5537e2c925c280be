use serde_json::{Map, Value};

use crate::template::is_template;

/// A node's inputs for one execution, materialized by the engine.
///
/// The engine starts from the node's base inputs, overlays connected
/// upstream outputs, and substitutes template variables where the context
/// has a value. Templates without a matching variable stay in place; the
/// typed accessors treat them as absent so node defaults apply, while
/// [`ResolvedInputs::raw`] exposes them verbatim.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
  values: Map<String, Value>,
}

impl ResolvedInputs {
  pub fn from_map(values: Map<String, Value>) -> Self {
    Self { values }
  }

  /// The raw value, including unresolved template strings.
  pub fn raw(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  /// The value, unless it is an unresolved template.
  pub fn value(&self, name: &str) -> Option<&Value> {
    self.values.get(name).filter(|v| !is_template(v))
  }

  /// Resolved string value; non-string scalars render via their JSON form.
  pub fn string(&self, name: &str) -> Option<String> {
    self.value(name).map(|v| match v {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    })
  }

  /// Resolved string with a default.
  pub fn string_or(&self, name: &str, default: &str) -> String {
    self.string(name).unwrap_or_else(|| default.to_string())
  }

  pub fn f64_or(&self, name: &str, default: f64) -> f64 {
    self.value(name).and_then(Value::as_f64).unwrap_or(default)
  }

  pub fn u64_or(&self, name: &str, default: u64) -> u64 {
    self.value(name).and_then(Value::as_u64).unwrap_or(default)
  }

  pub fn bool_or(&self, name: &str, default: bool) -> bool {
    self.value(name).and_then(Value::as_bool).unwrap_or(default)
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
    self.values.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn inputs(value: Value) -> ResolvedInputs {
    match value {
      Value::Object(map) => ResolvedInputs::from_map(map),
      _ => unreachable!(),
    }
  }

  #[test]
  fn unresolved_templates_read_as_absent() {
    let inputs = inputs(json!({"text": "{{missing}}", "count": 3}));
    assert_eq!(inputs.value("text"), None);
    assert_eq!(inputs.raw("text"), Some(&json!("{{missing}}")));
    assert_eq!(inputs.string_or("text", "fallback"), "fallback");
    assert_eq!(inputs.u64_or("count", 0), 3);
  }

  #[test]
  fn scalars_render_as_strings() {
    let inputs = inputs(json!({"n": 7, "flag": true}));
    assert_eq!(inputs.string_or("n", ""), "7");
    assert_eq!(inputs.string_or("flag", ""), "true");
    assert!(inputs.bool_or("flag", false));
  }
}
