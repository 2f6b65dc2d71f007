//! Body modifiers: Upsert/Replace/Delete over a decoded JSON body, operating
//! on `KEY=VALUE` env-array fields the way the Docker Engine API represents
//! container environments. Each modifier returns the rewritten body
//! alongside whether it actually changed anything, so the evaluator can
//! track `EvaluationResult::modified` without diffing.

use crate::matcher::request::body_contains;
use crate::matcher::value::pattern_matches_item;
use crate::model::Value;
use indexmap::IndexMap;

fn kv_key(v: &Value) -> Option<&str> {
  v.as_str().and_then(|s| s.split_once('=').map(|(k, _)| k))
}

/// Append-with-dedup: items not already present are appended; a `KEY=VALUE`
/// string whose `KEY` matches an existing entry replaces that entry in place
/// rather than duplicating it.
fn merge_array(existing: &[Value], incoming: &[Value]) -> (Vec<Value>, bool) {
  let mut result = existing.to_vec();
  let mut changed = false;
  for item in incoming {
    if let Some(key) = kv_key(item) {
      match result.iter().position(|e| kv_key(e) == Some(key)) {
        Some(idx) if result[idx] != *item => {
          result[idx] = item.clone();
          changed = true;
        }
        Some(_) => {}
        None => {
          result.push(item.clone());
          changed = true;
        }
      }
    } else if !result.contains(item) {
      result.push(item.clone());
      changed = true;
    }
  }
  (result, changed)
}

/// Set/overwrite every key in `update` on a fresh copy of `body`. Scalars and
/// objects replace outright; arrays merge with dedup via [`merge_array`].
/// The caller (the rule evaluator) is responsible for honouring an action's
/// own optional `contains` gate before calling this — Upsert has no gate of
/// its own baked in.
pub fn upsert(body: &IndexMap<String, Value>, update: &IndexMap<String, Value>) -> (IndexMap<String, Value>, bool) {
  let mut result = body.clone();
  let mut changed = false;
  for (key, new_val) in update {
    match new_val {
      Value::Array(items) => {
        let existing = result.get(key).and_then(|v| v.as_array()).unwrap_or(&[]).to_vec();
        let (merged, arr_changed) = merge_array(&existing, items);
        if arr_changed {
          changed = true;
        }
        result.insert(key.clone(), Value::Array(merged));
      }
      other => {
        if result.get(key) != Some(other) {
          changed = true;
        }
        result.insert(key.clone(), other.clone());
      }
    }
  }
  (result, changed)
}

/// Rewrite existing `KEY=VALUE` array entries in place by matching `KEY`; no
/// merge, no dedup, no append for unmatched keys. When none of the incoming
/// items look like `KEY=VALUE` pairs the whole array is overwritten outright,
/// matching Replace's plain scalar/object behaviour.
fn replace_array(existing: &[Value], incoming: &[Value]) -> (Vec<Value>, bool) {
  let any_kv = incoming.iter().any(|item| kv_key(item).is_some());
  if !any_kv {
    let changed = existing != incoming;
    return (incoming.to_vec(), changed);
  }
  let mut result = existing.to_vec();
  let mut changed = false;
  for item in incoming {
    if let Some(key) = kv_key(item) {
      if let Some(idx) = result.iter().position(|e| kv_key(e) == Some(key)) {
        if result[idx] != *item {
          result[idx] = item.clone();
          changed = true;
        }
      }
    }
  }
  (result, changed)
}

/// Overwrite every key in `update` on a fresh copy of `body`, gated by
/// `contains` matching the current body. A non-matching gate is a no-op,
/// not an error.
pub fn replace(
  body: &IndexMap<String, Value>,
  contains: &IndexMap<String, Value>,
  update: &IndexMap<String, Value>,
) -> (IndexMap<String, Value>, bool) {
  if !body_contains(contains, body) {
    return (body.clone(), false);
  }
  let mut result = body.clone();
  let mut changed = false;
  for (key, new_val) in update {
    match new_val {
      Value::Array(items) => {
        let existing = result.get(key).and_then(|v| v.as_array()).unwrap_or(&[]).to_vec();
        let (new_arr, arr_changed) = replace_array(&existing, items);
        if arr_changed {
          changed = true;
        }
        result.insert(key.clone(), Value::Array(new_arr));
      }
      other => {
        if result.get(key) != Some(other) {
          changed = true;
        }
        result.insert(key.clone(), other.clone());
      }
    }
  }
  (result, changed)
}

/// Remove fields named in `contains` whose current value matches the given
/// pattern. `contains` doubles as both the gate and the field/pattern
/// selector: a non-matching gate is a no-op; array fields drop only the
/// matching elements rather than the whole field.
pub fn delete(body: &IndexMap<String, Value>, contains: &IndexMap<String, Value>) -> (IndexMap<String, Value>, bool) {
  if !body_contains(contains, body) {
    return (body.clone(), false);
  }
  let mut result = body.clone();
  let mut changed = false;
  for (key, pattern) in contains {
    let Some(current) = result.get(key).cloned() else {
      continue;
    };
    match (pattern, &current) {
      (Value::Array(pattern_items), Value::Array(existing_items)) => {
        let filtered: Vec<Value> = existing_items
          .iter()
          .filter(|item| !pattern_items.iter().any(|p| pattern_matches_item(p, item)))
          .cloned()
          .collect();
        if filtered.len() != existing_items.len() {
          changed = true;
          result.insert(key.clone(), Value::Array(filtered));
        }
      }
      _ => {
        if crate::matcher::value::matches(pattern, &current) {
          result.shift_remove(key);
          changed = true;
        }
      }
    }
  }
  (result, changed)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn s(v: &str) -> Value {
    Value::String(v.to_string())
  }

  fn obj(pairs: Vec<(&str, Value)>) -> IndexMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
  }

  #[test]
  fn upsert_appends_new_scalar_field() {
    let body = obj(vec![("Image", s("nginx"))]);
    let update = obj(vec![("Privileged", Value::Bool(false))]);
    let (result, changed) = upsert(&body, &update);
    assert!(changed);
    assert_eq!(result.get("Privileged"), Some(&Value::Bool(false)));
    assert_eq!(result.get("Image"), Some(&s("nginx")));
  }

  #[test]
  fn upsert_env_appends_and_dedups_by_key() {
    let body = obj(vec![("Env", Value::Array(vec![s("A=1"), s("DEBUG=true")]))]);
    let update = obj(vec![("Env", Value::Array(vec![s("DEBUG=false"), s("NEW=1")]))]);
    let (result, changed) = upsert(&body, &update);
    assert!(changed);
    let env = result.get("Env").unwrap().as_array().unwrap().to_vec();
    assert_eq!(env, vec![s("A=1"), s("DEBUG=false"), s("NEW=1")]);
  }

  #[test]
  fn upsert_is_a_no_op_when_value_already_present() {
    let body = obj(vec![("Env", Value::Array(vec![s("A=1")]))]);
    let update = obj(vec![("Env", Value::Array(vec![s("A=1")]))]);
    let (_, changed) = upsert(&body, &update);
    assert!(!changed);
  }

  #[test]
  fn replace_rewrites_matching_env_entry_in_place() {
    let body = obj(vec![("Env", Value::Array(vec![s("DEBUG=true"), s("OTHER=x")]))]);
    let contains = obj(vec![("Env", Value::Array(vec![s("DEBUG=true")]))]);
    let update = obj(vec![("Env", Value::Array(vec![s("DEBUG=false")]))]);
    let (result, changed) = replace(&body, &contains, &update);
    assert!(changed);
    let env = result.get("Env").unwrap().as_array().unwrap().to_vec();
    assert_eq!(env, vec![s("DEBUG=false"), s("OTHER=x")]);
  }

  #[test]
  fn replace_is_a_no_op_when_gate_does_not_match() {
    let body = obj(vec![("Env", Value::Array(vec![s("DEBUG=true")]))]);
    let contains = obj(vec![("Env", Value::Array(vec![s("DEBUG=false")]))]);
    let update = obj(vec![("Env", Value::Array(vec![s("DEBUG=false")]))]);
    let (result, changed) = replace(&body, &contains, &update);
    assert!(!changed);
    assert_eq!(result, body);
  }

  #[test]
  fn replace_overwrites_scalar_field_outright() {
    let body = obj(vec![("Image", s("nginx:1.0"))]);
    let contains = obj(vec![("Image", s("nginx:1.0"))]);
    let update = obj(vec![("Image", s("nginx:2.0"))]);
    let (result, changed) = replace(&body, &contains, &update);
    assert!(changed);
    assert_eq!(result.get("Image"), Some(&s("nginx:2.0")));
  }

  #[test]
  fn delete_drops_matching_array_elements_only() {
    let body = obj(vec![("Env", Value::Array(vec![s("PANTS=on"), s("FOO=1")]))]);
    let contains = obj(vec![("Env", Value::Array(vec![s("PANTS=.*")]))]);
    let (result, changed) = delete(&body, &contains);
    assert!(changed);
    let env = result.get("Env").unwrap().as_array().unwrap().to_vec();
    assert_eq!(env, vec![s("FOO=1")]);
  }

  #[test]
  fn delete_removes_whole_scalar_field_on_match() {
    let body = obj(vec![("Privileged", Value::Bool(true))]);
    let contains = obj(vec![("Privileged", Value::Bool(true))]);
    let (result, changed) = delete(&body, &contains);
    assert!(changed);
    assert!(!result.contains_key("Privileged"));
  }

  #[test]
  fn delete_is_a_no_op_when_gate_does_not_match() {
    let body = obj(vec![("Privileged", Value::Bool(false))]);
    let contains = obj(vec![("Privileged", Value::Bool(true))]);
    let (result, changed) = delete(&body, &contains);
    assert!(!changed);
    assert_eq!(result, body);
  }
}
