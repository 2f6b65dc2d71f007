//! The rule evaluator: first-match-wins over an ordered rule list, applying
//! each matched rule's actions in order against a working copy of the
//! request body until an explicit `Allow`/`Deny` is reached or the action
//! list runs out.

use crate::matcher::request::{body_contains, CompositeRequestMatcher};
use crate::model::{Action, EvaluationResult, Request, Rule};
use crate::modifier;

/// Evaluate `request` against `rules` in order. An empty rule list, or a
/// request no rule's `match` selects, is allowed by default — this proxy
/// fails open on policy, not closed, since an unconfigured socket should
/// behave like a transparent pass-through.
pub fn evaluate(request: &Request, rules: &[Rule]) -> EvaluationResult {
  if rules.is_empty() {
    return EvaluationResult::allow("no rules configured");
  }
  for rule in rules {
    if CompositeRequestMatcher::from_match(&rule.match_).matches(request) {
      return apply_actions(request, &rule.actions);
    }
  }
  EvaluationResult::allow("no rule matched")
}

fn apply_actions(request: &Request, actions: &[Action]) -> EvaluationResult {
  let mut body = request.body.clone();
  let mut modified = false;

  for action in actions {
    match action {
      Action::Allow { reason, contains } => {
        if gated_out(contains, &body) {
          continue;
        }
        return EvaluationResult {
          allowed: true,
          reason: reason.clone().unwrap_or_else(|| "allowed".to_string()),
          modified,
          modified_body: modified.then(|| body.clone()),
        };
      }
      Action::Deny { reason, contains } => {
        if gated_out(contains, &body) {
          continue;
        }
        return EvaluationResult::deny(reason.clone());
      }
      Action::Upsert { update, contains } => {
        if gated_out(contains, &body) {
          continue;
        }
        let (new_body, changed) = modifier::upsert(&body, update);
        modified |= changed;
        body = new_body;
      }
      Action::Replace { contains, update } => {
        let (new_body, changed) = modifier::replace(&body, contains, update);
        modified |= changed;
        body = new_body;
      }
      Action::Delete { contains } => {
        let (new_body, changed) = modifier::delete(&body, contains);
        modified |= changed;
        body = new_body;
      }
    }
  }

  EvaluationResult {
    allowed: true,
    reason: "allowed after rewrites".to_string(),
    modified,
    modified_body: modified.then(|| body.clone()),
  }
}

fn gated_out(contains: &Option<indexmap::IndexMap<String, crate::model::Value>>, body: &indexmap::IndexMap<String, crate::model::Value>) -> bool {
  contains.as_ref().is_some_and(|c| !body_contains(c, body))
}
