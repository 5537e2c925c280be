//! Template-variable rule.
//!
//! A string input is a template only if the whole value has the exact form
//! `"{{name}}"`. Strings that merely contain `{{` are literals; templates
//! never embed further braces. Unresolvable templates are delivered to
//! nodes verbatim so their own defaults can apply.

use serde_json::Value;

/// Extract the variable name if `value` is a template expression.
pub fn template_var(value: &Value) -> Option<&str> {
  let s = value.as_str()?;
  let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
  let name = inner.trim();
  if name.is_empty() || name.contains('{') || name.contains('}') {
    return None;
  }
  Some(name)
}

/// Whether `value` is a template expression.
pub fn is_template(value: &Value) -> bool {
  template_var(value).is_some()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn exact_form_matches() {
    assert_eq!(template_var(&json!("{{user_query}}")), Some("user_query"));
    assert_eq!(template_var(&json!("{{ user_query }}")), Some("user_query"));
  }

  #[test]
  fn literals_do_not_match() {
    assert_eq!(template_var(&json!("{{a}} and {{b}}")), None);
    assert_eq!(template_var(&json!("prefix {{a}}")), None);
    assert_eq!(template_var(&json!("{{}}")), None);
    assert_eq!(template_var(&json!("{{a{b}}")), None);
    assert_eq!(template_var(&json!(42)), None);
    assert_eq!(template_var(&json!("plain")), None);
  }
}
