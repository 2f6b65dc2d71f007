//! Value matchers: match a decoded-JSON `Value` against a pattern literal.
//! Regexes are compiled once per distinct pattern string and cached in a
//! concurrent map, since the same pattern text is checked repeatedly across
//! requests.

use crate::model::Value;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

const REGEX_METACHARS: &[char] = &['.', '*', '+', '?', '^', '$', '(', ')', '[', ']', '{', '}', '|'];

static PATTERN_CACHE: Lazy<DashMap<String, Regex>> = Lazy::new(DashMap::new);

fn is_regex_pattern(s: &str) -> bool {
  s.chars().any(|c| REGEX_METACHARS.contains(&c))
}

fn compiled(pattern: &str) -> Option<Regex> {
  if let Some(re) = PATTERN_CACHE.get(pattern) {
    return Some(re.clone());
  }
  let anchored = format!("^(?:{pattern})$");
  let re = Regex::new(&anchored).ok()?;
  PATTERN_CACHE.insert(pattern.to_string(), re.clone());
  Some(re)
}

/// True iff `pattern` matches `actual` as a full-string match: literal
/// comparison when `pattern` has no regex metacharacters, otherwise a
/// compiled, cached regular expression. An empty pattern always matches.
pub fn string_matches(pattern: &str, actual: &str) -> bool {
  if pattern.is_empty() {
    return true;
  }
  if !is_regex_pattern(pattern) {
    return pattern == actual;
  }
  match compiled(pattern) {
    Some(re) => re.is_match(actual),
    None => pattern == actual,
  }
}

/// Structural match of `expected` against `actual`, recursing into arrays
/// and objects and falling back to [`string_matches`] for string leaves.
pub fn matches(expected: &Value, actual: &Value) -> bool {
  match (expected, actual) {
    (Value::Null, Value::Null) => true,
    (Value::Null, _) | (_, Value::Null) => false,

    (Value::String(pattern), Value::String(s)) => string_matches(pattern, s),

    (Value::String(pattern), Value::Array(items)) => items
      .iter()
      .any(|item| matches(&Value::String(pattern.clone()), item)),

    (Value::Array(expected_items), Value::Array(actual_items)) => expected_items
      .iter()
      .all(|expected_item| array_contains(expected_item, actual_items)),

    (Value::Object(expected_map), Value::Object(actual_map)) => expected_map.iter().all(|(k, v)| {
      actual_map
        .get(k)
        .map(|actual_v| matches(v, actual_v))
        .unwrap_or(false)
    }),

    (Value::Bool(a), Value::Bool(b)) => a == b,
    (Value::Number(a), Value::Number(b)) => a == b,

    _ => false,
  }
}

fn array_contains(expected_item: &Value, actual_items: &[Value]) -> bool {
  actual_items.iter().any(|item| pattern_matches_item(expected_item, item))
}

/// Does a single pattern value match a single actual value? String patterns
/// regex-match actual strings; anything else is structural equality. Used
/// both for array element "found" checks here and for array-element
/// deletion in the body modifiers.
pub fn pattern_matches_item(pattern: &Value, actual: &Value) -> bool {
  match pattern {
    Value::String(p) => actual.as_str().is_some_and(|s| string_matches(p, s)),
    other => other == actual,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use indexmap::IndexMap;

  fn s(v: &str) -> Value {
    Value::String(v.to_string())
  }

  #[test]
  fn empty_pattern_matches_everything() {
    assert!(matches(&s(""), &s("anything")));
  }

  #[test]
  fn literal_string_match() {
    assert!(matches(&s("POST"), &s("POST")));
    assert!(!matches(&s("POST"), &s("GET")));
  }

  #[test]
  fn regex_string_match() {
    assert!(matches(&s("/v1.*/containers/create"), &s("/v1.42/containers/create")));
    assert!(!matches(&s("/v1.*/containers/create"), &s("/v1.42/containers/create/extra")));
  }

  #[test]
  fn string_expected_against_array_actual() {
    let actual = Value::Array(vec![s("A=1"), s("DEBUG=true")]);
    assert!(matches(&s("DEBUG=.*"), &actual));
    assert!(!matches(&s("MISSING=.*"), &actual));
  }

  #[test]
  fn array_expected_requires_every_element_found() {
    let expected = Value::Array(vec![s("PANTS=.*")]);
    let actual = Value::Array(vec![s("PANTS=on"), s("FOO=1")]);
    assert!(matches(&expected, &actual));

    let expected2 = Value::Array(vec![s("PANTS=.*"), s("NOPE=.*")]);
    assert!(!matches(&expected2, &actual));
  }

  #[test]
  fn map_expected_is_subset_match() {
    let mut expected = IndexMap::new();
    expected.insert("Privileged".to_string(), Value::Bool(true));
    let mut actual = IndexMap::new();
    actual.insert("Privileged".to_string(), Value::Bool(true));
    actual.insert("Other".to_string(), s("ignored"));
    assert!(matches(&Value::Object(expected), &Value::Object(actual)));
  }

  #[test]
  fn null_matches_only_null() {
    assert!(matches(&Value::Null, &Value::Null));
    assert!(!matches(&Value::Null, &s("x")));
    assert!(!matches(&s("x"), &Value::Null));
  }

  #[test]
  fn mismatched_shapes_are_false() {
    assert!(!matches(&s("x"), &Value::Object(IndexMap::new())));
  }

  #[test]
  fn matcher_is_pure_and_repeatable() {
    let expected = s("/v1.*/containers/create");
    let actual = s("/v1.42/containers/create");
    let first = matches(&expected, &actual);
    let second = matches(&expected, &actual);
    assert_eq!(first, second);
  }
}
