//! Query identities and their string cache keys.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Separator placed between the rendered parts of a key.
pub const KEY_SEPARATOR: char = '|';

/// Ordered list of values identifying one logical request, e.g. `["todos", 7, {"done": false}]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryKey {
  parts: Vec<Value>,
}

impl QueryKey {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a part. Strings, numbers, booleans and JSON values are accepted.
  pub fn part(mut self, part: impl Into<Value>) -> Self {
    self.parts.push(part.into());
    self
  }

  /// Append any serializable value as a structural part.
  pub fn object<S: Serialize>(mut self, part: &S) -> serde_json::Result<Self> {
    self.parts.push(serde_json::to_value(part)?);
    Ok(self)
  }

  pub fn parts(&self) -> &[Value] {
    &self.parts
  }

  pub fn is_empty(&self) -> bool {
    self.parts.is_empty()
  }

  /// Reduce the identity to its cache key.
  ///
  /// Strings are used verbatim, numbers and booleans in their display form, everything else
  /// as compact JSON with object keys sorted. Parts are joined with [`KEY_SEPARATOR`], so a
  /// string part containing the separator can collide with two shorter parts.
  pub fn cache_hash(&self) -> String {
    let mut key = String::new();
    for (i, part) in self.parts.iter().enumerate() {
      if i > 0 {
        key.push(KEY_SEPARATOR);
      }
      match part {
        Value::String(s) => key.push_str(s),
        Value::Number(n) => key.push_str(&n.to_string()),
        Value::Bool(b) => key.push_str(if *b { "true" } else { "false" }),
        other => key.push_str(&other.to_string()),
      }
    }
    key
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.cache_hash())
  }
}

impl From<&str> for QueryKey {
  fn from(part: &str) -> Self {
    Self::new().part(part)
  }
}

impl From<String> for QueryKey {
  fn from(part: String) -> Self {
    Self::new().part(part)
  }
}

impl From<Vec<Value>> for QueryKey {
  fn from(parts: Vec<Value>) -> Self {
    Self { parts }
  }
}

impl FromIterator<Value> for QueryKey {
  fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
    Self {
      parts: iter.into_iter().collect(),
    }
  }
}

impl Extend<Value> for QueryKey {
  fn extend<I: IntoIterator<Item = Value>>(&mut self, iter: I) {
    self.parts.extend(iter);
  }
}

/// Build a [`QueryKey`] from a list of parts.
///
/// ```ignore
/// let key = query_key!["todos", 7, serde_json::json!({ "done": false })];
/// assert_eq!(key.cache_hash(), r#"todos|7|{"done":false}"#);
/// ```
#[macro_export]
macro_rules! query_key {
  ($($part:expr),* $(,)?) => {
    $crate::QueryKey::new()$(.part($part))*
  };
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_primitive_parts() {
    let key = QueryKey::new().part("todos").part(7).part(true).part(1.5);
    assert_eq!(key.cache_hash(), "todos|7|true|1.5");
  }

  #[test]
  fn test_object_parts_are_json() {
    let key = QueryKey::new()
      .part("todos")
      .part(json!({ "done": false, "tags": ["a", "b"] }));
    assert_eq!(key.cache_hash(), r#"todos|{"done":false,"tags":["a","b"]}"#);
  }

  #[test]
  fn test_null_part() {
    let key = QueryKey::new().part("user").part(Value::Null);
    assert_eq!(key.cache_hash(), "user|null");
  }

  #[test]
  fn test_structurally_equal_objects_match() {
    let a = QueryKey::new().part(json!({ "page": 1, "size": 20 }));
    let b = QueryKey::new().part(json!({ "size": 20, "page": 1 }));
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_order_matters() {
    let a = QueryKey::new().part("a").part("b");
    let b = QueryKey::new().part("b").part("a");
    assert_ne!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_object_content_matters() {
    let a = QueryKey::new().part(json!({ "page": 1 }));
    let b = QueryKey::new().part(json!({ "page": 2 }));
    assert_ne!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_separator_collision() {
    let joined = QueryKey::from("a|b");
    let split = QueryKey::new().part("a").part("b");
    assert_eq!(joined.cache_hash(), split.cache_hash());
  }

  #[test]
  fn test_serializable_part() {
    #[derive(Serialize)]
    struct Filter {
      status: &'static str,
      limit: u32,
    }

    let key = QueryKey::from("issues")
      .object(&Filter {
        status: "open",
        limit: 10,
      })
      .map(|k| k.cache_hash());
    assert_eq!(key.ok().as_deref(), Some(r#"issues|{"limit":10,"status":"open"}"#));
  }

  #[test]
  fn test_macro() {
    let key = crate::query_key!["todos", 7, json!({ "done": false })];
    assert_eq!(key.cache_hash(), r#"todos|7|{"done":false}"#);
    assert_eq!(key.to_string(), key.cache_hash());
    assert_eq!(crate::query_key![].cache_hash(), "");
  }
}
