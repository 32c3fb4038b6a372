//! Workflow Orchestrator: the main entry point for the workflow engine
//!
//! The orchestrator composes the shared store, the definition store and the
//! application state machine behind the orchestration API consumed by the
//! application service. It declares stage-entry events; it never delivers
//! notifications or touches documents itself.

use crate::audit_logger::AuditLogger;
use crate::config::EngineConfig;
use crate::definition_store::DefinitionStore;
use crate::events::{EventBus, StageEnteredEvent};
use crate::state_machine::{ApplicationStateMachine, TransitionOutcome};
use crate::store::WorkflowStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use workflow_types::*;

/// An application's position together with its current stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStateView {
    #[serde(flatten)]
    pub state: ApplicationWorkflowState,
    /// Current stage as defined in the pinned revision
    pub stage: Stage,
}

/// The Workflow Orchestrator
#[derive(Clone, Debug)]
pub struct WorkflowOrchestrator {
    store: Arc<WorkflowStore>,
    definitions: DefinitionStore,
    state_machine: ApplicationStateMachine,
    config: EngineConfig,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator over a fresh in-memory store
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(WorkflowStore::new(config.commit_retries));
        let events = EventBus::new(config.event_channel_capacity);
        Self {
            definitions: DefinitionStore::new(store.clone()),
            state_machine: ApplicationStateMachine::new(store.clone(), events, config.clone()),
            store,
            config,
        }
    }

    /// Administrative structural API
    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub fn audit(&self) -> &AuditLogger {
        self.store.audit()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive stage-entry events as they are committed
    pub fn subscribe(&self) -> broadcast::Receiver<StageEnteredEvent> {
        self.state_machine.subscribe()
    }

    // ── Orchestration API ────────────────────────────────────────────

    pub fn get_active_definition(
        &self,
        category: &ApplicationCategory,
    ) -> WorkflowResult<WorkflowDefinition> {
        self.definitions.active_for(category)
    }

    /// Current stage and history, resolved against the pinned revision
    pub fn get_application_state(
        &self,
        application_id: &ApplicationId,
    ) -> WorkflowResult<ApplicationStateView> {
        let state = self.state_machine.state(application_id)?;
        let definition = self
            .store
            .pinned(state.definition_id, state.definition_revision)?;
        let stage = definition
            .stage(state.current_stage_id)
            .cloned()
            .ok_or_else(|| {
                WorkflowError::InvariantViolation(format!(
                    "application {} points at stage {} outside its pinned revision",
                    application_id, state.current_stage_id
                ))
            })?;
        Ok(ApplicationStateView { state, stage })
    }

    /// Attach a new application to its category's active definition
    pub fn attach(
        &self,
        application_id: &ApplicationId,
        category: &ApplicationCategory,
        actor: &Actor,
        context: &ApplicationContext,
    ) -> WorkflowResult<TransitionOutcome> {
        self.state_machine
            .attach(application_id, category, actor, context)
    }

    pub fn request_transition(
        &self,
        application_id: &ApplicationId,
        transition_id: TransitionId,
        actor: &Actor,
        context: &ApplicationContext,
    ) -> WorkflowResult<TransitionOutcome> {
        self.state_machine
            .request_manual_transition(application_id, transition_id, actor, context)
    }

    pub fn get_eligible_transitions(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
        context: &ApplicationContext,
    ) -> WorkflowResult<Vec<Transition>> {
        self.state_machine
            .eligible_transitions(application_id, actor, context)
    }

    /// Re-run automatic evaluation, e.g. from an external scheduler
    pub fn reevaluate(
        &self,
        application_id: &ApplicationId,
        context: &ApplicationContext,
    ) -> WorkflowResult<TransitionOutcome> {
        self.state_machine.reevaluate(application_id, context)
    }

    /// Document contract: what the document subsystem must hold for a stage
    pub fn required_documents(&self, stage_id: StageId) -> WorkflowResult<BTreeSet<String>> {
        self.definitions.required_documents(stage_id)
    }
}

impl Default for WorkflowOrchestrator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Actor {
        Actor::new("admin").with_write_access()
    }

    fn setup() -> (WorkflowOrchestrator, WorkflowDefinition) {
        let orch = WorkflowOrchestrator::default();
        let def = orch
            .definitions()
            .create(
                NewDefinition::new("Scholarship", "scholarship")
                    .with_stage(StageSpec::named("Applied").with_required_document("essay"))
                    .with_stage(StageSpec::named("Awarded"))
                    .with_transition(TransitionSpec::new("Applied", "Awarded", "Award")),
                &admin(),
            )
            .unwrap();
        let def = orch.definitions().activate(def.id, &admin()).unwrap();
        (orch, def)
    }

    #[test]
    fn test_active_definition_lookup() {
        let (orch, def) = setup();
        let found = orch
            .get_active_definition(&ApplicationCategory::new("Scholarship"))
            .unwrap();
        assert_eq!(found.id, def.id);
        assert!(matches!(
            orch.get_active_definition(&ApplicationCategory::new("transfer")),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_application_state_view() {
        let (orch, def) = setup();
        let app = ApplicationId::new("S-1");
        orch.attach(
            &app,
            &ApplicationCategory::new("scholarship"),
            &admin(),
            &ApplicationContext::new(),
        )
        .unwrap();

        let view = orch.get_application_state(&app).unwrap();
        assert_eq!(view.stage.name, "Applied");
        assert_eq!(view.state.history.len(), 1);

        let applied = def.stage_by_name("Applied").unwrap().id;
        assert!(orch.required_documents(applied).unwrap().contains("essay"));

        let outcome = orch
            .request_transition(&app, def.transitions[0].id, &admin(), &ApplicationContext::new())
            .unwrap();
        assert_eq!(outcome.entered[0].stage_name, "Awarded");
        assert!(orch.get_eligible_transitions(&app, &admin(), &ApplicationContext::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_application() {
        let orch = WorkflowOrchestrator::default();
        assert!(matches!(
            orch.get_application_state(&ApplicationId::new("nope")),
            Err(WorkflowError::NotFound(_))
        ));
    }
}
