//! Wire types shared by the rule engine, the socket repository and both HTTP surfaces.

use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// A decoded JSON value, kept order-preserving so persisted configs round-trip
/// byte-for-byte equal to how they were authored.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Bool(bool),
  Number(serde_json::Number),
  String(String),
  Array(Vec<Value>),
  Object(IndexMap<String, Value>),
}

impl Value {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_array(&self) -> Option<&[Value]> {
    match self {
      Value::Array(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
    match self {
      Value::Object(m) => Some(m),
      _ => None,
    }
  }
}

impl From<serde_json::Value> for Value {
  fn from(v: serde_json::Value) -> Self {
    match v {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(b),
      serde_json::Value::Number(n) => Value::Number(n),
      serde_json::Value::String(s) => Value::String(s),
      serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
      serde_json::Value::Object(o) => {
        Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
      }
    }
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Value::Null => serializer.serialize_unit(),
      Value::Bool(b) => serializer.serialize_bool(*b),
      Value::Number(n) => n.serialize(serializer),
      Value::String(s) => serializer.serialize_str(s),
      Value::Array(a) => a.serialize(serializer),
      Value::Object(o) => o.serialize(serializer),
    }
  }
}

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    serde_json::Value::deserialize(deserializer).map(Value::from)
  }
}

/// `{ path, method, contains }` — an unset field matches anything.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Match {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contains: Option<IndexMap<String, Value>>,
}

/// A single rule action. Field requirements per action type are enforced by
/// which fields are present in each variant: a `Deny` missing a `reason`, or
/// a `Replace` missing `update`, simply fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
  Allow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contains: Option<IndexMap<String, Value>>,
  },
  Deny {
    reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contains: Option<IndexMap<String, Value>>,
  },
  Upsert {
    update: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contains: Option<IndexMap<String, Value>>,
  },
  Replace {
    contains: IndexMap<String, Value>,
    update: IndexMap<String, Value>,
  },
  Delete {
    contains: IndexMap<String, Value>,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
  #[serde(rename = "match")]
  pub match_: Match,
  pub actions: Vec<Action>,
}

/// Opaque, core-agnostic per-socket extras. `propagate_socket` is never
/// interpreted by the rule engine or proxy runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SocketExtra {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub propagate_socket: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_body_bytes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketConfig {
  pub name: String,
  pub listen_address: String,
  pub docker_daemon_url: String,
  #[serde(default)]
  pub config: SocketExtra,
  #[serde(default)]
  pub rules: Vec<Rule>,
}

impl SocketConfig {
  pub fn max_body_bytes(&self) -> usize {
    self.config.max_body_bytes.unwrap_or(8 * 1024 * 1024)
  }
}

/// Wire payload for `/socket/create`. `name` is optional here — unlike
/// `SocketConfig::name`, which is always resolved by the time a socket is
/// live — so the manager can mint a UUID-based name when the caller omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketCreateRequest {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default)]
  pub listen_address: String,
  pub docker_daemon_url: String,
  #[serde(default)]
  pub config: SocketExtra,
  #[serde(default)]
  pub rules: Vec<Rule>,
}

/// A decoded inbound request. `body` is empty, not absent, when the payload
/// doesn't decode as a JSON object — body-conditional actions are then
/// simply skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: String,
  pub path: String,
  pub body: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationResult {
  pub allowed: bool,
  pub reason: String,
  pub modified: bool,
  pub modified_body: Option<IndexMap<String, Value>>,
}

impl EvaluationResult {
  pub fn allow(reason: impl Into<String>) -> Self {
    Self {
      allowed: true,
      reason: reason.into(),
      modified: false,
      modified_body: None,
    }
  }

  pub fn deny(reason: impl Into<String>) -> Self {
    Self {
      allowed: false,
      reason: reason.into(),
      modified: false,
      modified_body: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn value_round_trips_through_json_preserving_key_order() {
    let raw = r#"{"zeta":1,"alpha":[true,null,"x"],"middle":{"nested":2}}"#;
    let parsed: Value = serde_json::from_str(raw).unwrap();
    let out = serde_json::to_string(&parsed).unwrap();
    assert_eq!(raw, out);
  }

  #[test]
  fn deny_action_requires_reason_field() {
    let json = r#"{"type":"Deny","contains":{}}"#;
    let result: Result<Action, _> = serde_json::from_str(json);
    assert!(result.is_err());
  }

  #[test]
  fn replace_action_requires_contains_and_update() {
    let json = r#"{"type":"Replace","update":{"Env":["A=1"]}}"#;
    let result: Result<Action, _> = serde_json::from_str(json);
    assert!(result.is_err());
  }
}
