//! Workflow definitions: the stage graph for one application category
//!
//! A WorkflowDefinition is a directed graph where:
//! - Nodes are stages (processing phases, ordered by a dense sequence index)
//! - Edges are transitions (conditional, optionally role-gated)
//!
//! Definitions are structurally frozen while active. Every structural change
//! bumps `revision`, and applications stay pinned to the revision they
//! started on.

use crate::{Transition, TransitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

// ── Identifiers ──────────────────────────────────────────────────────

numeric_id!(
    /// Unique identifier for a workflow definition
    DefinitionId
);

numeric_id!(
    /// Unique identifier for a stage
    StageId
);

/// The application type a definition serves (e.g. `undergraduate`)
///
/// Categories are compared case-insensitively; the stored form is trimmed
/// and lowercased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ApplicationCategory(String);

impl ApplicationCategory {
    pub fn new(category: impl AsRef<str>) -> Self {
        Self(category.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ApplicationCategory {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<ApplicationCategory> for String {
    fn from(value: ApplicationCategory) -> Self {
        value.0
    }
}

impl std::fmt::Display for ApplicationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A role name, as issued by the identity system
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Workflow Definition ──────────────────────────────────────────────

/// A workflow definition: the stage graph for one application category
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier
    pub id: DefinitionId,
    /// Human-readable name
    pub name: String,
    /// Description of what this workflow covers
    #[serde(default)]
    pub description: String,
    /// The application category this definition serves
    pub category: ApplicationCategory,
    /// Whether this is the category's live definition
    pub active: bool,
    /// Structural revision, bumped on every stage/transition change
    pub revision: u32,
    /// Optimistic concurrency counter, bumped on every commit
    #[serde(default)]
    pub version: u64,
    /// Stages, kept sorted by sequence index
    pub stages: Vec<Stage>,
    /// Transitions, kept sorted by id
    pub transitions: Vec<Transition>,
    /// Who created this definition
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create an empty, inactive definition
    pub fn new(
        id: DefinitionId,
        name: impl Into<String>,
        category: ApplicationCategory,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: String::new(),
            category,
            active: false,
            revision: 1,
            version: 0,
            stages: Vec::new(),
            transitions: Vec::new(),
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Get a stage by ID
    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Get a mutable stage by ID
    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == id)
    }

    /// Find a stage by exact name
    pub fn stage_by_name(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The stage with the lowest sequence index; applications start here
    pub fn initial_stage(&self) -> Option<&Stage> {
        self.stages.iter().min_by_key(|s| s.sequence)
    }

    /// The stage with the highest sequence index
    pub fn last_stage(&self) -> Option<&Stage> {
        self.stages.iter().max_by_key(|s| s.sequence)
    }

    /// Get a transition by ID
    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == id)
    }

    /// Get a mutable transition by ID
    pub fn transition_mut(&mut self, id: TransitionId) -> Option<&mut Transition> {
        self.transitions.iter_mut().find(|t| t.id == id)
    }

    /// Outgoing transitions from a stage, in ascending id order
    pub fn outgoing(&self, stage_id: StageId) -> Vec<&Transition> {
        let mut out: Vec<&Transition> = self
            .transitions
            .iter()
            .filter(|t| t.source == stage_id)
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// Automatic outgoing transitions from a stage, in ascending id order
    pub fn automatic_outgoing(&self, stage_id: StageId) -> Vec<&Transition> {
        self.outgoing(stage_id)
            .into_iter()
            .filter(|t| t.is_automatic)
            .collect()
    }

    /// Incoming transitions to a stage
    pub fn incoming(&self, stage_id: StageId) -> Vec<&Transition> {
        self.transitions
            .iter()
            .filter(|t| t.target == stage_id)
            .collect()
    }

    /// A stage with no outgoing transitions ends the workflow
    pub fn is_terminal(&self, stage_id: StageId) -> bool {
        !self.transitions.iter().any(|t| t.source == stage_id)
    }

    /// All stages with no outgoing transitions
    pub fn terminal_stages(&self) -> Vec<&Stage> {
        self.stages
            .iter()
            .filter(|s| self.is_terminal(s.id))
            .collect()
    }

    /// The set of stage ids belonging to this definition
    pub fn stage_ids(&self) -> HashSet<StageId> {
        self.stages.iter().map(|s| s.id).collect()
    }

    /// Sort stages by sequence and transitions by id
    pub fn normalize_order(&mut self) {
        self.stages.sort_by_key(|s| s.sequence);
        self.transitions.sort_by_key(|t| t.id);
    }

    /// Reassign sequence indices 1..N, keeping the current relative order
    pub fn resequence(&mut self) {
        self.stages.sort_by_key(|s| s.sequence);
        for (index, stage) in self.stages.iter_mut().enumerate() {
            stage.sequence = index as u32 + 1;
        }
    }

    /// Whether sequence indices are exactly 1..N
    pub fn has_contiguous_sequence(&self) -> bool {
        let mut sequences: Vec<u32> = self.stages.iter().map(|s| s.sequence).collect();
        sequences.sort_unstable();
        sequences
            .iter()
            .enumerate()
            .all(|(index, sequence)| *sequence == index as u32 + 1)
    }

    /// Required document types for a stage
    pub fn required_documents(&self, stage_id: StageId) -> Option<&BTreeSet<String>> {
        self.stage(stage_id).map(|s| &s.required_documents)
    }

    /// Total number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Total number of transitions
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }
}

// ── Stage ────────────────────────────────────────────────────────────

/// A node in the workflow graph: one processing phase
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique identifier
    pub id: StageId,
    /// The definition that owns this stage
    pub definition_id: DefinitionId,
    /// Human-readable name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Dense position within the definition, starting at 1
    pub sequence: u32,
    /// Document types the document subsystem must hold for this stage
    #[serde(default)]
    pub required_documents: BTreeSet<String>,
    /// Actions that must be performed while in this stage
    #[serde(default)]
    pub required_actions: BTreeSet<String>,
    /// Declared notification intents
    #[serde(default)]
    pub notification_triggers: Vec<NotificationTrigger>,
    /// The role responsible for this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_role: Option<RoleId>,
}

impl Stage {
    pub fn new(
        id: StageId,
        definition_id: DefinitionId,
        name: impl Into<String>,
        sequence: u32,
    ) -> Self {
        Self {
            id,
            definition_id,
            name: name.into(),
            description: String::new(),
            sequence,
            required_documents: BTreeSet::new(),
            required_actions: BTreeSet::new(),
            notification_triggers: Vec::new(),
            assigned_role: None,
        }
    }

    pub fn with_required_document(mut self, document_type: impl Into<String>) -> Self {
        self.required_documents.insert(document_type.into());
        self
    }

    pub fn with_required_action(mut self, action: impl Into<String>) -> Self {
        self.required_actions.insert(action.into());
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

    /// Notification triggers declared for an event
    pub fn triggers_for(&self, event: &str) -> Vec<NotificationTrigger> {
        self.notification_triggers
            .iter()
            .filter(|t| t.event == event)
            .cloned()
            .collect()
    }
}

// ── Notification Triggers ────────────────────────────────────────────

/// Event name declared when an application enters a stage
pub const ON_ENTER_EVENT: &str = "on_enter";

/// Delivery channel requested from the notification subsystem
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    InApp,
    Push,
}

/// A declared notification intent: event → recipients → channels
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTrigger {
    /// Event name, e.g. `on_enter`
    pub event: String,
    /// Roles that should be notified
    #[serde(default)]
    pub recipient_roles: BTreeSet<RoleId>,
    /// Channels to deliver on
    #[serde(default)]
    pub channels: BTreeSet<NotificationChannel>,
}

impl NotificationTrigger {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            recipient_roles: BTreeSet::new(),
            channels: BTreeSet::new(),
        }
    }

    /// A trigger fired when an application enters the stage
    pub fn on_enter() -> Self {
        Self::new(ON_ENTER_EVENT)
    }

    pub fn notify(mut self, role: RoleId) -> Self {
        self.recipient_roles.insert(role);
        self
    }

    pub fn via(mut self, channel: NotificationChannel) -> Self {
        self.channels.insert(channel);
        self
    }
}
