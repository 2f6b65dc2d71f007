//! Request matchers: lift the value matchers in [`super::value`] up to
//! whole-request predicates, and lower a `Match` criterion into a composite
//! of only the matchers whose pattern is actually set.

use crate::matcher::value::{matches as value_matches, string_matches};
use crate::model::{Match, Request, Value};

pub trait RequestMatcher {
  fn matches(&self, request: &Request) -> bool;
}

pub struct PathMatcher(pub String);

impl RequestMatcher for PathMatcher {
  fn matches(&self, request: &Request) -> bool {
    string_matches(&self.0, &request.path)
  }
}

pub struct MethodMatcher(pub String);

impl RequestMatcher for MethodMatcher {
  fn matches(&self, request: &Request) -> bool {
    string_matches(&self.0, &request.method)
  }
}

pub struct BodyMatcher(pub indexmap::IndexMap<String, Value>);

impl RequestMatcher for BodyMatcher {
  fn matches(&self, request: &Request) -> bool {
    let expected = Value::Object(self.0.clone());
    let actual = Value::Object(request.body.clone());
    value_matches(&expected, &actual)
  }
}

/// Conjunction of the matchers whose pattern was actually set on a `Match`.
/// A fully-empty `Match` lowers to an empty composite, which matches everything.
#[derive(Default)]
pub struct CompositeRequestMatcher {
  matchers: Vec<Box<dyn RequestMatcher + Send + Sync>>,
}

impl CompositeRequestMatcher {
  pub fn from_match(m: &Match) -> Self {
    let mut matchers: Vec<Box<dyn RequestMatcher + Send + Sync>> = Vec::new();
    if let Some(path) = &m.path {
      if !path.is_empty() {
        matchers.push(Box::new(PathMatcher(path.clone())));
      }
    }
    if let Some(method) = &m.method {
      if !method.is_empty() {
        matchers.push(Box::new(MethodMatcher(method.clone())));
      }
    }
    if let Some(contains) = &m.contains {
      if !contains.is_empty() {
        matchers.push(Box::new(BodyMatcher(contains.clone())));
      }
    }
    Self { matchers }
  }

  pub fn matches(&self, request: &Request) -> bool {
    self.matchers.iter().all(|m| m.matches(request))
  }
}

/// Gate used by action-level `contains` predicates: matches against the
/// *current* working body rather than the original request body.
pub fn body_contains(contains: &indexmap::IndexMap<String, Value>, body: &indexmap::IndexMap<String, Value>) -> bool {
  value_matches(&Value::Object(contains.clone()), &Value::Object(body.clone()))
}
