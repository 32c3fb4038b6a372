//! Condition evaluator: checks a transition's conditions against a context
//!
//! Conditions are conjunctive and an empty list always holds. Evaluation
//! is a pure function and never fails: a field that cannot be resolved
//! makes its condition false, whatever the operator.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use workflow_types::{
    Actor, ApplicationContext, ConditionField, ConditionOperator, TransitionCondition,
};

/// Everything a condition may read
#[derive(Clone, Debug)]
pub struct EvaluationContext<'a> {
    pub application: &'a ApplicationContext,
    /// The acting actor; absent for engine-initiated evaluation
    pub actor: Option<&'a Actor>,
    pub entered_stage_at: DateTime<Utc>,
    /// Evaluation instant
    pub now: DateTime<Utc>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(application: &'a ApplicationContext, entered_stage_at: DateTime<Utc>) -> Self {
        Self {
            application,
            actor: None,
            entered_stage_at,
            now: application.evaluation_instant(),
        }
    }

    pub fn with_actor(mut self, actor: &'a Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn days_in_stage(&self) -> f64 {
        let elapsed = self.now.signed_duration_since(self.entered_stage_at);
        elapsed.num_milliseconds() as f64 / 86_400_000.0
    }
}

/// Result of checking a condition list
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionResult {
    Satisfied,
    NotSatisfied { reason: String },
}

impl ConditionResult {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// A resolved field value
enum Resolved {
    Value(Value),
    Roles(Vec<String>),
}

/// Evaluates transition conditions
#[derive(Clone, Debug, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// True iff every condition holds
    pub fn evaluate(&self, conditions: &[TransitionCondition], ctx: &EvaluationContext<'_>) -> bool {
        conditions.iter().all(|c| self.evaluate_one(c, ctx))
    }

    /// Like `evaluate`, naming the first condition that does not hold
    pub fn check(
        &self,
        conditions: &[TransitionCondition],
        ctx: &EvaluationContext<'_>,
    ) -> ConditionResult {
        match conditions.iter().find(|c| !self.evaluate_one(c, ctx)) {
            None => ConditionResult::Satisfied,
            Some(failed) => ConditionResult::NotSatisfied {
                reason: format!("condition '{}' does not hold", failed),
            },
        }
    }

    pub fn evaluate_one(&self, condition: &TransitionCondition, ctx: &EvaluationContext<'_>) -> bool {
        let result = match self.resolve(&condition.field, ctx) {
            None => false,
            Some(Resolved::Roles(roles)) => compare_roles(&roles, condition.operator, &condition.value),
            Some(Resolved::Value(left)) => compare(&left, condition.operator, &condition.value),
        };
        tracing::debug!(condition = %condition, result, "Condition evaluated");
        result
    }

    fn resolve(&self, field: &ConditionField, ctx: &EvaluationContext<'_>) -> Option<Resolved> {
        match field {
            ConditionField::DocumentStatus { document_type } => ctx
                .application
                .document_status(document_type)
                .map(|status| Resolved::Value(Value::String(status.to_string()))),
            ConditionField::ApplicationData { path } => {
                resolve_path(&ctx.application.data, path).map(|v| Resolved::Value(v.clone()))
            }
            ConditionField::DaysInStage => {
                serde_json::Number::from_f64(ctx.days_in_stage())
                    .map(|n| Resolved::Value(Value::Number(n)))
            }
            ConditionField::ActorRole => ctx.actor.map(|actor| {
                Resolved::Roles(actor.roles.iter().map(|r| r.as_str().to_string()).collect())
            }),
        }
    }
}

/// Walk a dotted path; numeric segments index arrays. Null counts as absent.
fn resolve_path<'v>(data: &'v Value, path: &str) -> Option<&'v Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let mut current = data;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

fn compare_roles(roles: &[String], operator: ConditionOperator, value: &Value) -> bool {
    let wanted = canonical(value);
    match operator {
        ConditionOperator::Equals => roles.iter().any(|r| *r == wanted),
        ConditionOperator::NotEquals => !roles.iter().any(|r| *r == wanted),
        ConditionOperator::Contains => roles.iter().any(|r| r.contains(wanted.as_str())),
        ConditionOperator::NotContains => !roles.iter().any(|r| r.contains(wanted.as_str())),
        ConditionOperator::GreaterThan | ConditionOperator::LessThan => false,
    }
}

fn compare(left: &Value, operator: ConditionOperator, right: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => loose_eq(left, right),
        ConditionOperator::NotEquals => !loose_eq(left, right),
        ConditionOperator::GreaterThan => order(left, right) == Some(Ordering::Greater),
        ConditionOperator::LessThan => order(left, right) == Some(Ordering::Less),
        ConditionOperator::Contains => contains(left, right).unwrap_or(false),
        ConditionOperator::NotContains => contains(left, right).map(|c| !c).unwrap_or(false),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn canonical(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a == b,
        _ => canonical(left) == canonical(right),
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

/// Membership for arrays and objects, substring for strings; None for scalars
fn contains(container: &Value, needle: &Value) -> Option<bool> {
    match container {
        Value::Array(items) => Some(items.iter().any(|item| loose_eq(item, needle))),
        Value::Object(map) => Some(map.contains_key(&canonical(needle))),
        Value::String(s) => Some(s.contains(canonical(needle).as_str())),
        _ => None,
    }
}
