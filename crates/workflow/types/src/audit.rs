//! Audit records: one immutable, hash-linked entry per mutation

use crate::{ApplicationId, DefinitionId, StageId, TransitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of mutation was recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Activate,
    Deactivate,
    Duplicate,
    StageCreate,
    StageUpdate,
    StageDelete,
    StageReorder,
    TransitionCreate,
    TransitionUpdate,
    TransitionDelete,
    ApplicationStart,
    ApplicationTransition,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Duplicate => "duplicate",
            Self::StageCreate => "stage_create",
            Self::StageUpdate => "stage_update",
            Self::StageDelete => "stage_delete",
            Self::StageReorder => "stage_reorder",
            Self::TransitionCreate => "transition_create",
            Self::TransitionUpdate => "transition_update",
            Self::TransitionDelete => "transition_delete",
            Self::ApplicationStart => "application_start",
            Self::ApplicationTransition => "application_transition",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown audit action: {}", s))
    }
}

/// The record a mutation touched
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum AuditEntity {
    Definition(DefinitionId),
    Stage(StageId),
    Transition(TransitionId),
    Application(ApplicationId),
}

impl std::fmt::Display for AuditEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Definition(id) => write!(f, "definition:{}", id),
            Self::Stage(id) => write!(f, "stage:{}", id),
            Self::Transition(id) => write!(f, "transition:{}", id),
            Self::Application(id) => write!(f, "application:{}", id),
        }
    }
}

impl std::str::FromStr for AuditEntity {
    type Err = String;

    /// Parses the `kind:id` form produced by `Display`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected kind:id, got {}", s))?;
        let bad_id = |_| format!("invalid {} id: {}", kind, id);
        match kind {
            "definition" => id.parse().map(Self::Definition).map_err(bad_id),
            "stage" => id.parse().map(Self::Stage).map_err(bad_id),
            "transition" => id.parse().map(Self::Transition).map_err(bad_id),
            "application" if !id.is_empty() => Ok(Self::Application(ApplicationId::new(id))),
            _ => Err(format!("unknown audit entity: {}", s)),
        }
    }
}

/// A mutation waiting to be appended to the audit log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditAppend {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub entity: AuditEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl AuditAppend {
    pub fn new(actor: impl Into<String>, action: AuditAction, entity: AuditEntity) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            entity,
            before: None,
            after: None,
            detail: None,
        }
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A committed audit entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    /// Position in the log, starting at 1
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub entity: AuditEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub previous_hash: Option<String>,
    pub hash: String,
}

impl AuditEntry {
    /// The appended content, without chain metadata
    pub fn content(&self) -> AuditAppend {
        AuditAppend {
            timestamp: self.timestamp,
            actor: self.actor.clone(),
            action: self.action,
            entity: self.entity.clone(),
            before: self.before.clone(),
            after: self.after.clone(),
            detail: self.detail.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_match_wire_format() {
        for action in [
            AuditAction::Create,
            AuditAction::StageReorder,
            AuditAction::ApplicationTransition,
        ] {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, serde_json::Value::String(action.as_str().to_string()));
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("launch".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_entity_parse_and_display() {
        let entity: AuditEntity = "definition:12".parse().unwrap();
        assert_eq!(entity, AuditEntity::Definition(DefinitionId::new(12)));
        assert_eq!(entity.to_string(), "definition:12");

        let app: AuditEntity = "application:APP-7".parse().unwrap();
        assert_eq!(app, AuditEntity::Application(ApplicationId::new("APP-7")));

        assert!("stage:abc".parse::<AuditEntity>().is_err());
        assert!("widget:1".parse::<AuditEntity>().is_err());
        assert!("definition".parse::<AuditEntity>().is_err());
    }

    #[test]
    fn test_entity_wire_format() {
        let json = serde_json::to_value(AuditEntity::Stage(StageId::new(3))).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "stage", "id": 3 }));
    }
}
