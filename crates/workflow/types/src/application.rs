//! Application workflow state: the per-application stage pointer
//!
//! Applications are case records owned by an external system. The engine
//! only keeps their position in the pinned definition revision, their stage
//! history and a version counter for optimistic concurrency.

use crate::{ApplicationCategory, DefinitionId, RoleId, StageId, TransitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Identifiers ──────────────────────────────────────────────────────

/// Opaque application identifier supplied by the owning case system
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Actor ────────────────────────────────────────────────────────────

/// Name of the actor used for engine-internal and bootstrap writes
pub const SYSTEM_ACTOR: &str = "system";

/// An authenticated identity acting on the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub roles: BTreeSet<RoleId>,
    /// Whether the actor may write to the application record
    #[serde(default)]
    pub write_access: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            write_access: false,
        }
    }

    /// The bootstrap actor: write access, role `system`
    pub fn system() -> Self {
        Self::new(SYSTEM_ACTOR)
            .with_role(RoleId::new(SYSTEM_ACTOR))
            .with_write_access()
    }

    pub fn with_role(mut self, role: RoleId) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn with_write_access(mut self) -> Self {
        self.write_access = true;
        self
    }

    pub fn has_role(&self, role: &RoleId) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role(&self, roles: &BTreeSet<RoleId>) -> bool {
        self.roles.iter().any(|r| roles.contains(r))
    }
}

// ── Evaluation Context ───────────────────────────────────────────────

/// External facts supplied by the caller for condition evaluation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationContext {
    /// Document type → status, as reported by the document subsystem
    #[serde(default)]
    pub document_statuses: BTreeMap<String, String>,
    /// The application's form data
    #[serde(default)]
    pub data: serde_json::Value,
    /// Evaluation instant; defaults to now
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl ApplicationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document_status(
        mut self,
        document_type: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        self.document_statuses
            .insert(document_type.into(), status.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn at(mut self, instant: DateTime<Utc>) -> Self {
        self.evaluated_at = Some(instant);
        self
    }

    pub fn document_status(&self, document_type: &str) -> Option<&str> {
        self.document_statuses.get(document_type).map(String::as_str)
    }

    pub fn evaluation_instant(&self) -> DateTime<Utc> {
        self.evaluated_at.unwrap_or_else(Utc::now)
    }
}

// ── Application State ────────────────────────────────────────────────

/// One stay in a stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageVisit {
    pub stage_id: StageId,
    pub entered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
    /// Transition that brought the application here; None for the initial stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entered_via: Option<TransitionId>,
    /// Transition that took the application out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_via: Option<TransitionId>,
}

/// The per-application stage pointer and history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicationWorkflowState {
    pub application_id: ApplicationId,
    pub category: ApplicationCategory,
    /// Definition pinned at attach time
    pub definition_id: DefinitionId,
    /// Structural revision of the pinned definition
    pub definition_revision: u32,
    pub current_stage_id: StageId,
    pub entered_stage_at: DateTime<Utc>,
    pub history: Vec<StageVisit>,
    /// Optimistic concurrency counter, bumped on every commit
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationWorkflowState {
    /// Start an application in its initial stage
    pub fn start(
        application_id: ApplicationId,
        category: ApplicationCategory,
        definition_id: DefinitionId,
        definition_revision: u32,
        initial_stage: StageId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            application_id,
            category,
            definition_id,
            definition_revision,
            current_stage_id: initial_stage,
            entered_stage_at: at,
            history: vec![StageVisit {
                stage_id: initial_stage,
                entered_at: at,
                exited_at: None,
                entered_via: None,
                exited_via: None,
            }],
            version: 0,
            created_at: at,
            updated_at: at,
        }
    }

    /// The open history entry for the current stage
    pub fn current_visit(&self) -> Option<&StageVisit> {
        self.history.last().filter(|v| v.exited_at.is_none())
    }

    /// Close the current visit and open one for `target`
    pub fn move_to(&mut self, target: StageId, via: TransitionId, at: DateTime<Utc>) {
        if let Some(visit) = self.history.last_mut() {
            if visit.exited_at.is_none() {
                visit.exited_at = Some(at);
                visit.exited_via = Some(via);
            }
        }
        self.history.push(StageVisit {
            stage_id: target,
            entered_at: at,
            exited_at: None,
            entered_via: Some(via),
            exited_via: None,
        });
        self.current_stage_id = target;
        self.entered_stage_at = at;
        self.updated_at = at;
    }

    /// Days (with fractions) spent in the current stage as of `at`
    pub fn days_in_stage(&self, at: DateTime<Utc>) -> f64 {
        let elapsed = at.signed_duration_since(self.entered_stage_at);
        elapsed.num_milliseconds() as f64 / 86_400_000.0
    }

    /// Stage ids in visit order
    pub fn visited_stages(&self) -> Vec<StageId> {
        self.history.iter().map(|v| v.stage_id).collect()
    }
}
