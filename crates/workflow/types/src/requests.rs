//! Request payloads for the administrative structural API
//!
//! Transitions inside a request may refer to stages either by id or, for
//! stages created in the same request, by name.

use crate::{
    ApplicationCategory, NotificationTrigger, RoleId, StageId, TransitionCondition, TransitionId,
    WorkflowDefinition,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A stage reference inside a request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageRef {
    Id(StageId),
    Name(String),
}

impl From<StageId> for StageRef {
    fn from(id: StageId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for StageRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl std::fmt::Display for StageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{}", id),
            Self::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Stage content; `id` selects an existing stage when replacing a graph
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StageId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_documents: BTreeSet<String>,
    #[serde(default)]
    pub required_actions: BTreeSet<String>,
    #[serde(default)]
    pub notification_triggers: Vec<NotificationTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_role: Option<RoleId>,
}

impl StageSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_required_document(mut self, document_type: impl Into<String>) -> Self {
        self.required_documents.insert(document_type.into());
        self
    }

    pub fn with_trigger(mut self, trigger: NotificationTrigger) -> Self {
        self.notification_triggers.push(trigger);
        self
    }

    pub fn with_assigned_role(mut self, role: RoleId) -> Self {
        self.assigned_role = Some(role);
        self
    }
}

/// Transition content; `id` selects an existing transition when replacing a graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TransitionId>,
    pub source: StageRef,
    pub target: StageRef,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub conditions: Vec<TransitionCondition>,
    #[serde(default)]
    pub required_permissions: BTreeSet<RoleId>,
    #[serde(default)]
    pub is_automatic: bool,
}

impl TransitionSpec {
    pub fn new(
        source: impl Into<StageRef>,
        target: impl Into<StageRef>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
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
}

/// Data for `create`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ApplicationCategory,
    /// Stages in sequence order
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
}

impl NewDefinition {
    pub fn new(name: impl Into<String>, category: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: ApplicationCategory::new(category),
            stages: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_transition(mut self, transition: TransitionSpec) -> Self {
        self.transitions.push(transition);
        self
    }
}

/// Data for `update`
///
/// `name` and `description` are metadata and may change while active.
/// `category`, `stages` and `transitions` are structural; `stages` and
/// `transitions` replace the whole graph (entries with an `id` update the
/// existing record, entries without one are created, omitted ones are
/// deleted).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ApplicationCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitions: Option<Vec<TransitionSpec>>,
}

impl DefinitionPatch {
    /// Whether applying this patch would change the graph or category of `current`
    pub fn is_structural_for(&self, current: &WorkflowDefinition) -> bool {
        let category_change = self
            .category
            .as_ref()
            .is_some_and(|c| *c != current.category);
        category_change || self.stages.is_some() || self.transitions.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.stages.is_none()
            && self.transitions.is_none()
    }
}

/// Data for `add_stage`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewStage {
    #[serde(flatten)]
    pub stage: StageSpec,
    /// 1-based insert position; appended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

/// Data for `update_stage`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_documents: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_actions: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_triggers: Option<Vec<NotificationTrigger>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_role: Option<RoleId>,
    /// Remove the assigned role
    #[serde(default)]
    pub clear_assigned_role: bool,
}

/// Data for `update_transition`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<StageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<StageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<TransitionCondition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_permissions: Option<BTreeSet<RoleId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_automatic: Option<bool>,
}

/// Filter for `list`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ApplicationCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Case-insensitive substring of the definition name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl DefinitionFilter {
    pub fn matches(&self, definition: &WorkflowDefinition) -> bool {
        if let Some(category) = &self.category {
            if *category != definition.category {
                return false;
            }
        }
        if let Some(active) = self.active {
            if active != definition.active {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let term = term.trim().to_lowercase();
            if !term.is_empty() && !definition.name.to_lowercase().contains(&term) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefinitionId;

    fn make_definition(name: &str, category: &str, active: bool) -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new(
            DefinitionId::new(1),
            name,
            ApplicationCategory::new(category),
            "admin",
        );
        def.active = active;
        def
    }

    #[test]
    fn test_filter_matches() {
        let def = make_definition("UG-2024 Intake", "undergraduate", true);

        assert!(DefinitionFilter::default().matches(&def));
        let by_search = DefinitionFilter {
            search: Some("intake".into()),
            ..Default::default()
        };
        assert!(by_search.matches(&def));

        let wrong_category = DefinitionFilter {
            category: Some(ApplicationCategory::new("postgraduate")),
            ..Default::default()
        };
        assert!(!wrong_category.matches(&def));

        let inactive_only = DefinitionFilter {
            active: Some(false),
            ..Default::default()
        };
        assert!(!inactive_only.matches(&def));
    }

    #[test]
    fn test_stage_ref_accepts_id_or_name() {
        let by_id: StageRef = serde_json::from_str("4").unwrap();
        assert_eq!(by_id, StageRef::Id(StageId::new(4)));
        let by_name: StageRef = serde_json::from_str("\"Submitted\"").unwrap();
        assert_eq!(by_name, StageRef::Name("Submitted".into()));
    }

    #[test]
    fn test_patch_structural_detection() {
        let def = make_definition("UG", "undergraduate", true);

        let rename = DefinitionPatch {
            name: Some("UG v2".into()),
            description: Some("updated".into()),
            ..Default::default()
        };
        assert!(!rename.is_structural_for(&def));

        let same_category = DefinitionPatch {
            category: Some(ApplicationCategory::new("Undergraduate")),
            ..Default::default()
        };
        assert!(!same_category.is_structural_for(&def));

        let regraph = DefinitionPatch {
            stages: Some(vec![StageSpec::named("Only")]),
            ..Default::default()
        };
        assert!(regraph.is_structural_for(&def));
        assert!(DefinitionPatch::default().is_empty());
    }

    #[test]
    fn test_new_stage_flattens_spec() {
        let req: NewStage = serde_json::from_value(serde_json::json!({
            "name": "Interview",
            "required_documents": ["passport"],
            "position": 2
        }))
        .unwrap();
        assert_eq!(req.stage.name, "Interview");
        assert!(req.stage.required_documents.contains("passport"));
        assert_eq!(req.position, Some(2));
    }
}
