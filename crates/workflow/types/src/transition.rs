//! Transitions: directed edges between stages
//!
//! A transition carries a conjunctive condition list and a
//! required-permission set. Automatic transitions fire on their own when
//! their conditions hold; manual ones must be requested by an authorized
//! actor.

use crate::{DefinitionId, RoleId, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

numeric_id!(
    /// Unique identifier for a transition
    TransitionId
);

/// A directed edge in the workflow graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Unique identifier
    pub id: TransitionId,
    /// The definition that owns this transition
    pub definition_id: DefinitionId,
    /// Source stage
    pub source: StageId,
    /// Target stage (never equal to source)
    pub target: StageId,
    /// Human-readable name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// All conditions must hold for the transition to be eligible
    #[serde(default)]
    pub conditions: Vec<TransitionCondition>,
    /// Roles allowed to request this transition; empty means any writer
    #[serde(default)]
    pub required_permissions: BTreeSet<RoleId>,
    /// Whether the engine fires this transition on its own
    #[serde(default)]
    pub is_automatic: bool,
}

impl Transition {
    pub fn new(
        id: TransitionId,
        definition_id: DefinitionId,
        source: StageId,
        target: StageId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            definition_id,
            source,
            target,
            name: name.into(),
            description: String::new(),
            conditions: Vec::new(),
            required_permissions: BTreeSet::new(),
            is_automatic: false,
        }
    }

    pub fn automatic(mut self) -> Self {
        self.is_automatic = true;
        self
    }

    pub fn with_condition(mut self, condition: TransitionCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn requires(mut self, role: RoleId) -> Self {
        self.required_permissions.insert(role);
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    pub fn connects(&self, stage_id: StageId) -> bool {
        self.source == stage_id || self.target == stage_id
    }
}

// ── Conditions ───────────────────────────────────────────────────────

/// The context value a condition reads
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionField {
    /// Status reported by the document subsystem for one document type
    DocumentStatus { document_type: String },
    /// Dotted path into the application's form data (`address.country`, `items.0`)
    ApplicationData { path: String },
    /// Days since the application entered its current stage
    DaysInStage,
    /// The acting actor's role set
    ActorRole,
}

impl std::fmt::Display for ConditionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DocumentStatus { document_type } => write!(f, "document_status({})", document_type),
            Self::ApplicationData { path } => write!(f, "application_data({})", path),
            Self::DaysInStage => write!(f, "days_in_stage"),
            Self::ActorRole => write!(f, "actor_role"),
        }
    }
}

/// Comparison operator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
        }
    }
}

/// One predicate over the application context
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionCondition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: serde_json::Value,
}

impl TransitionCondition {
    pub fn new(
        field: ConditionField,
        operator: ConditionOperator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
        }
    }

    pub fn document_status(
        document_type: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self::new(
            ConditionField::DocumentStatus {
                document_type: document_type.into(),
            },
            operator,
            value,
        )
    }

    pub fn application_data(
        path: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self::new(
            ConditionField::ApplicationData { path: path.into() },
            operator,
            value,
        )
    }

    pub fn days_in_stage(operator: ConditionOperator, days: f64) -> Self {
        Self::new(ConditionField::DaysInStage, operator, days)
    }

    pub fn actor_role(operator: ConditionOperator, role: impl Into<String>) -> Self {
        Self::new(ConditionField::ActorRole, operator, role.into())
    }
}

impl std::fmt::Display for TransitionCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator.as_str(), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_wire_format() {
        let condition =
            TransitionCondition::document_status("transcript", ConditionOperator::Equals, "verified");
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "field": { "kind": "document_status", "document_type": "transcript" },
                "operator": "equals",
                "value": "verified"
            })
        );

        let parsed: TransitionCondition = serde_json::from_value(serde_json::json!({
            "field": { "kind": "days_in_stage" },
            "operator": "greater_than",
            "value": 14
        }))
        .unwrap();
        assert_eq!(parsed.field, ConditionField::DaysInStage);
        assert_eq!(parsed.operator, ConditionOperator::GreaterThan);
    }

    #[test]
    fn test_transition_builder() {
        let t = Transition::new(
            TransitionId::new(1),
            DefinitionId::new(1),
            StageId::new(1),
            StageId::new(2),
            "Approve",
        )
        .requires(RoleId::new("reviewer"))
        .with_condition(TransitionCondition::actor_role(
            ConditionOperator::Equals,
            "reviewer",
        ));

        assert!(!t.is_automatic);
        assert!(!t.is_self_loop());
        assert!(t.connects(StageId::new(2)));
        assert!(!t.connects(StageId::new(3)));
        assert_eq!(t.conditions.len(), 1);
        assert!(t.required_permissions.contains(&RoleId::new("reviewer")));
    }

    #[test]
    fn test_defaults_on_deserialize() {
        let t: Transition = serde_json::from_value(serde_json::json!({
            "id": 7,
            "definition_id": 1,
            "source": 1,
            "target": 2,
            "name": "Next"
        }))
        .unwrap();
        assert_eq!(t.id, TransitionId::new(7));
        assert!(t.conditions.is_empty());
        assert!(t.required_permissions.is_empty());
        assert!(!t.is_automatic);
    }

    #[test]
    fn test_condition_display() {
        let c = TransitionCondition::application_data("gpa", ConditionOperator::GreaterThan, 3.0);
        assert_eq!(c.to_string(), "application_data(gpa) greater_than 3.0");
    }
}
