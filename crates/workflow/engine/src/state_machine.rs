//! Application state machine: moves applications through their pinned graph
//!
//! The states are the stage ids of the definition revision an application
//! was attached to. Entering a stage declares its `on_enter` triggers and
//! fires at most one automatic outgoing transition (the lowest-id one whose
//! conditions hold), after which the target stage is entered in turn. The
//! chain is bounded by `max_automatic_chain`.
//!
//! A manual request and its automatic follow-up chain commit as one unit
//! together with their audit entries; stage-entry events are published
//! only after that commit.

use crate::condition_evaluator::{ConditionEvaluator, ConditionResult, EvaluationContext};
use crate::config::EngineConfig;
use crate::events::{EventBus, StageEnteredEvent};
use crate::store::{UnitOfWork, WorkflowStore};
use crate::transition_authorizer::{AuthorizationDecision, TransitionAuthorizer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use workflow_types::{
    Actor, ApplicationCategory, ApplicationContext, ApplicationId, ApplicationWorkflowState,
    AuditAction, AuditAppend, AuditEntity, Transition, TransitionId, WorkflowDefinition,
    WorkflowError, WorkflowResult,
};

/// What one state-machine call did
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    /// Committed application state
    pub state: ApplicationWorkflowState,
    /// Transitions fired, in order
    pub fired: Vec<TransitionId>,
    /// Stages entered, in order
    pub entered: Vec<StageEnteredEvent>,
    /// Whether the automatic chain stopped at its configured bound
    pub chain_truncated: bool,
}

/// Effects collected while a unit runs; discarded if the unit is retried
#[derive(Default)]
struct Run {
    fired: Vec<TransitionId>,
    automatic_fired: usize,
    entered: Vec<StageEnteredEvent>,
    audit: Vec<AuditAppend>,
    chain_truncated: bool,
}

/// Drives applications through their workflow
#[derive(Clone, Debug)]
pub struct ApplicationStateMachine {
    store: Arc<WorkflowStore>,
    evaluator: ConditionEvaluator,
    authorizer: TransitionAuthorizer,
    events: EventBus,
    config: EngineConfig,
}

impl ApplicationStateMachine {
    pub fn new(store: Arc<WorkflowStore>, events: EventBus, config: EngineConfig) -> Self {
        Self {
            store,
            evaluator: ConditionEvaluator::new(),
            authorizer: TransitionAuthorizer::new(),
            events,
            config,
        }
    }

    /// Attach an application to its category's active definition
    pub fn attach(
        &self,
        application_id: &ApplicationId,
        category: &ApplicationCategory,
        actor: &Actor,
        context: &ApplicationContext,
    ) -> WorkflowResult<TransitionOutcome> {
        if !actor.write_access {
            return Err(WorkflowError::Unauthorized(format!(
                "actor '{}' has no write access",
                actor.id
            )));
        }

        let context = &fix_clock(context);
        let outcome = self.store.with_application_lock(application_id, || {
            self.run_unit("attach", application_id, |unit| {
                if unit.application(application_id)?.is_some() {
                    return Err(WorkflowError::Conflict(format!(
                        "application {} is already attached",
                        application_id
                    )));
                }
                let active = unit
                    .definitions()?
                    .into_iter()
                    .find(|d| d.active && d.category == *category)
                    .ok_or_else(|| {
                        WorkflowError::NotFound(format!(
                            "no active definition for category {}",
                            category
                        ))
                    })?;
                let definition = unit.pin(&active)?;
                let initial = definition.initial_stage().ok_or_else(|| {
                    WorkflowError::InvariantViolation(format!(
                        "active definition {} has no stages",
                        definition.id
                    ))
                })?;

                let now = context.evaluation_instant();
                let mut state = ApplicationWorkflowState::start(
                    application_id.clone(),
                    category.clone(),
                    definition.id,
                    definition.revision,
                    initial.id,
                    now,
                );

                let mut run = Run::default();
                run.audit.push(
                    AuditAppend::new(
                        &actor.id,
                        AuditAction::ApplicationStart,
                        AuditEntity::Application(application_id.clone()),
                    )
                    .with_after(json!({
                        "definition_id": definition.id,
                        "definition_revision": definition.revision,
                        "stage_id": initial.id,
                    })),
                );
                run.entered.push(StageEnteredEvent::new(
                    application_id.clone(),
                    initial,
                    None,
                    now,
                ));
                self.enter_stage(&definition, &mut state, context, actor, &mut run)?;
                Ok((state, run))
            })
        })?;

        tracing::info!(
            application_id = %application_id,
            definition_id = %outcome.state.definition_id,
            stage_id = %outcome.state.current_stage_id,
            actor = %actor.id,
            "Application attached"
        );
        Ok(outcome)
    }

    /// Manually fire a transition out of the current stage
    pub fn request_manual_transition(
        &self,
        application_id: &ApplicationId,
        transition_id: TransitionId,
        actor: &Actor,
        context: &ApplicationContext,
    ) -> WorkflowResult<TransitionOutcome> {
        let context = &fix_clock(context);
        let outcome = self.store.with_application_lock(application_id, || {
            self.run_unit("request_transition", application_id, |unit| {
                let mut state = load_state(unit, application_id)?;
                let definition = unit.pinned(state.definition_id, state.definition_revision)?;
                let transition = definition.transition(transition_id).ok_or_else(|| {
                    WorkflowError::NotFound(format!(
                        "transition {} in definition {} revision {}",
                        transition_id, state.definition_id, state.definition_revision
                    ))
                })?;

                if transition.source != state.current_stage_id {
                    return Err(WorkflowError::InvalidTransition(format!(
                        "transition '{}' does not leave current stage {}",
                        transition.name, state.current_stage_id
                    )));
                }
                if let AuthorizationDecision::Denied { reason } =
                    self.authorizer.authorize(transition, actor)
                {
                    tracing::info!(
                        application_id = %application_id,
                        transition_id = %transition_id,
                        actor = %actor.id,
                        reason = %reason,
                        "Manual transition denied"
                    );
                    return Err(WorkflowError::Unauthorized(reason));
                }
                let ctx = EvaluationContext::new(context, state.entered_stage_at).with_actor(actor);
                if let ConditionResult::NotSatisfied { reason } =
                    self.evaluator.check(&transition.conditions, &ctx)
                {
                    return Err(WorkflowError::ConditionNotMet(reason));
                }

                let mut run = Run::default();
                let at = context.evaluation_instant();
                self.fire(&definition, &mut state, transition, actor, false, at, &mut run)?;
                self.enter_stage(&definition, &mut state, context, actor, &mut run)?;
                Ok((state, run))
            })
        })?;

        tracing::info!(
            application_id = %application_id,
            transition_id = %transition_id,
            stage_id = %outcome.state.current_stage_id,
            fired = outcome.fired.len(),
            actor = %actor.id,
            "Manual transition committed"
        );
        Ok(outcome)
    }

    /// Re-run automatic evaluation for the current stage
    ///
    /// Used by external schedulers for time-based rules and after the
    /// context changes. Commits nothing when no transition fires.
    pub fn reevaluate(
        &self,
        application_id: &ApplicationId,
        context: &ApplicationContext,
    ) -> WorkflowResult<TransitionOutcome> {
        let actor = Actor::system();
        let context = &fix_clock(context);
        let outcome = self.store.with_application_lock(application_id, || {
            self.run_unit("reevaluate", application_id, |unit| {
                let mut state = load_state(unit, application_id)?;
                let definition = unit.pinned(state.definition_id, state.definition_revision)?;
                let mut run = Run::default();
                self.enter_stage(&definition, &mut state, context, &actor, &mut run)?;
                Ok((state, run))
            })
        })?;

        tracing::debug!(
            application_id = %application_id,
            fired = outcome.fired.len(),
            "Application re-evaluated"
        );
        Ok(outcome)
    }

    /// Manual transitions out of the current stage this actor may fire now
    pub fn eligible_transitions(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
        context: &ApplicationContext,
    ) -> WorkflowResult<Vec<Transition>> {
        let state = self.store.application(application_id)?;
        let definition = self
            .store
            .pinned(state.definition_id, state.definition_revision)?;
        let ctx = EvaluationContext::new(context, state.entered_stage_at).with_actor(actor);

        Ok(definition
            .outgoing(state.current_stage_id)
            .into_iter()
            .filter(|t| self.authorizer.authorize(t, actor).is_allowed())
            .filter(|t| self.evaluator.evaluate(&t.conditions, &ctx))
            .cloned()
            .collect())
    }

    pub fn state(&self, application_id: &ApplicationId) -> WorkflowResult<ApplicationWorkflowState> {
        self.store.application(application_id)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StageEnteredEvent> {
        self.events.subscribe()
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Run `work` as a unit, commit it, then publish its events
    fn run_unit(
        &self,
        operation: &str,
        application_id: &ApplicationId,
        mut work: impl FnMut(&mut UnitOfWork<'_>) -> WorkflowResult<(ApplicationWorkflowState, Run)>,
    ) -> WorkflowResult<TransitionOutcome> {
        let ((fallback, run), outcome) = self.store.transact(operation, |unit| {
            let (state, run) = work(unit)?;
            if !run.audit.is_empty() {
                unit.put_application(state.clone());
                for event in &run.audit {
                    unit.record(event.clone());
                }
            }
            Ok((state, run))
        })?;

        let state = if run.audit.is_empty() {
            fallback
        } else {
            outcome.application(application_id)?
        };
        self.events.publish(run.entered.clone());

        Ok(TransitionOutcome {
            state,
            fired: run.fired,
            entered: run.entered,
            chain_truncated: run.chain_truncated,
        })
    }

    /// Evaluate automatic exits of the stage just entered
    ///
    /// Fires the lowest-id automatic transition whose conditions hold, then
    /// does the same for its target, until no exit is eligible or the chain
    /// bound is hit. The entry event itself is staged by the caller.
    ///
    /// `context` must carry a fixed evaluation instant: entered stages are
    /// stamped with it, so a chained days-in-stage rule sees zero elapsed.
    fn enter_stage(
        &self,
        definition: &WorkflowDefinition,
        state: &mut ApplicationWorkflowState,
        context: &ApplicationContext,
        actor: &Actor,
        run: &mut Run,
    ) -> WorkflowResult<()> {
        loop {
            let ctx = EvaluationContext::new(context, state.entered_stage_at).with_actor(actor);
            let Some(next) = definition
                .automatic_outgoing(state.current_stage_id)
                .into_iter()
                .find(|t| self.evaluator.evaluate(&t.conditions, &ctx))
            else {
                return Ok(());
            };

            if run.automatic_fired >= self.config.max_automatic_chain {
                tracing::warn!(
                    application_id = %state.application_id,
                    stage_id = %state.current_stage_id,
                    limit = self.config.max_automatic_chain,
                    "Automatic transition chain bound reached; stopping"
                );
                run.chain_truncated = true;
                return Ok(());
            }
            let at = context.evaluation_instant();
            self.fire(definition, state, next, actor, true, at, run)?;
        }
    }

    /// Move the pointer along one transition and stage its effects
    #[allow(clippy::too_many_arguments)]
    fn fire(
        &self,
        definition: &WorkflowDefinition,
        state: &mut ApplicationWorkflowState,
        transition: &Transition,
        actor: &Actor,
        automatic: bool,
        now: DateTime<Utc>,
        run: &mut Run,
    ) -> WorkflowResult<()> {
        let target = definition.stage(transition.target).ok_or_else(|| {
            WorkflowError::InvariantViolation(format!(
                "transition {} targets unknown stage {}",
                transition.id, transition.target
            ))
        })?;
        let from = state.current_stage_id;
        state.move_to(target.id, transition.id, now);

        run.audit.push(
            AuditAppend::new(
                &actor.id,
                AuditAction::ApplicationTransition,
                AuditEntity::Application(state.application_id.clone()),
            )
            .at(now)
            .with_before(json!({ "stage_id": from }))
            .with_after(json!({ "stage_id": target.id }))
            .with_detail(json!({
                "transition_id": transition.id,
                "transition_name": transition.name,
                "automatic": automatic,
                "definition_id": definition.id,
                "definition_revision": definition.revision,
            })),
        );
        run.entered.push(StageEnteredEvent::new(
            state.application_id.clone(),
            target,
            Some(transition.id),
            now,
        ));
        run.fired.push(transition.id);
        if automatic {
            run.automatic_fired += 1;
        }

        tracing::debug!(
            application_id = %state.application_id,
            transition_id = %transition.id,
            from = %from,
            to = %target.id,
            automatic,
            "Transition fired"
        );
        Ok(())
    }
}

/// Pin the evaluation instant for one call
///
/// Stage entry times and condition checks then read the same clock, so a
/// scheduler-supplied instant cannot make a freshly entered stage look old.
fn fix_clock(context: &ApplicationContext) -> ApplicationContext {
    context.clone().at(context.evaluation_instant())
}

fn load_state(
    unit: &mut UnitOfWork<'_>,
    application_id: &ApplicationId,
) -> WorkflowResult<ApplicationWorkflowState> {
    unit.application(application_id)?
        .ok_or_else(|| WorkflowError::NotFound(format!("application {}", application_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition_store::DefinitionStore;
    use workflow_types::{
        ConditionOperator, NewDefinition, RoleId, StageSpec, TransitionCondition, TransitionSpec,
    };

    struct Fixture {
        store: Arc<WorkflowStore>,
        definitions: DefinitionStore,
        machine: ApplicationStateMachine,
    }

    fn fixture(config: EngineConfig) -> Fixture {
        let store = Arc::new(WorkflowStore::default());
        let events = EventBus::new(config.event_channel_capacity);
        Fixture {
            definitions: DefinitionStore::new(store.clone()),
            machine: ApplicationStateMachine::new(store.clone(), events, config),
            store,
        }
    }

    fn admin() -> Actor {
        Actor::new("admin").with_write_access()
    }

    fn reviewer() -> Actor {
        Actor::new("rita")
            .with_role(RoleId::new("reviewer"))
            .with_write_access()
    }

    fn install(f: &Fixture, data: NewDefinition) -> WorkflowDefinition {
        let def = f.definitions.create(data, &admin()).unwrap();
        f.definitions.activate(def.id, &admin()).unwrap()
    }

    fn ug_2024() -> NewDefinition {
        NewDefinition::new("UG-2024", "undergraduate")
            .with_stage(StageSpec::named("Submitted"))
            .with_stage(StageSpec::named("DocsVerified"))
            .with_stage(StageSpec::named("Decision"))
            .with_transition(
                TransitionSpec::new("Submitted", "DocsVerified", "Verify")
                    .requires(RoleId::new("reviewer")),
            )
            .with_transition(
                TransitionSpec::new("DocsVerified", "Decision", "Auto decide")
                    .automatic()
                    .with_condition(TransitionCondition::document_status(
                        "transcript",
                        ConditionOperator::Equals,
                        "verified",
                    )),
            )
    }

    fn category() -> ApplicationCategory {
        ApplicationCategory::new("undergraduate")
    }

    #[test]
    fn test_attach_enters_initial_stage() {
        let f = fixture(EngineConfig::default());
        let def = install(&f, ug_2024());
        let app = ApplicationId::new("APP-1");

        let outcome = f
            .machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();
        assert_eq!(outcome.state.definition_id, def.id);
        assert_eq!(
            outcome.state.current_stage_id,
            def.stage_by_name("Submitted").unwrap().id
        );
        assert_eq!(outcome.entered.len(), 1);
        assert!(outcome.fired.is_empty());

        assert!(matches!(
            f.machine
                .attach(&app, &category(), &admin(), &ApplicationContext::new()),
            Err(WorkflowError::Conflict(_))
        ));
        assert!(matches!(
            f.machine.attach(
                &ApplicationId::new("APP-2"),
                &ApplicationCategory::new("postgraduate"),
                &admin(),
                &ApplicationContext::new()
            ),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_manual_request_error_order() {
        let f = fixture(EngineConfig::default());
        let def = install(&f, ug_2024());
        let app = ApplicationId::new("APP-1");
        f.machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();

        let verify = def.transitions[0].id;
        let auto = def.transitions[1].id;
        let ctx = ApplicationContext::new();

        assert!(matches!(
            f.machine
                .request_manual_transition(&app, TransitionId::new(9_999), &reviewer(), &ctx),
            Err(WorkflowError::NotFound(_))
        ));
        assert!(matches!(
            f.machine.request_manual_transition(&app, auto, &reviewer(), &ctx),
            Err(WorkflowError::InvalidTransition(_))
        ));
        let outsider = Actor::new("olga").with_write_access();
        assert!(matches!(
            f.machine.request_manual_transition(&app, verify, &outsider, &ctx),
            Err(WorkflowError::Unauthorized(_))
        ));

        let state = f.machine.state(&app).unwrap();
        assert_eq!(state.history.len(), 1);
        assert!(f
            .store
            .audit()
            .by_action(AuditAction::ApplicationTransition)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_condition_not_met() {
        let f = fixture(EngineConfig::default());
        let def = install(
            &f,
            NewDefinition::new("Gated", "undergraduate")
                .with_stage(StageSpec::named("A"))
                .with_stage(StageSpec::named("B"))
                .with_transition(TransitionSpec::new("A", "B", "Go").with_condition(
                    TransitionCondition::application_data("gpa", ConditionOperator::GreaterThan, 3.0),
                )),
        );
        let app = ApplicationId::new("APP-1");
        f.machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();

        let low = ApplicationContext::new().with_data(json!({ "gpa": 2.5 }));
        assert!(matches!(
            f.machine
                .request_manual_transition(&app, def.transitions[0].id, &admin(), &low),
            Err(WorkflowError::ConditionNotMet(_))
        ));
        let high = ApplicationContext::new().with_data(json!({ "gpa": "3.4" }));
        let outcome = f
            .machine
            .request_manual_transition(&app, def.transitions[0].id, &admin(), &high)
            .unwrap();
        assert_eq!(outcome.state.history.len(), 2);
    }

    #[test]
    fn test_automatic_chain_is_bounded() {
        let f = fixture(EngineConfig::default().with_max_automatic_chain(2));
        let mut data = NewDefinition::new("Chain", "undergraduate");
        for name in ["S1", "S2", "S3", "S4", "S5"] {
            data = data.with_stage(StageSpec::named(name));
        }
        for (from, to) in [("S1", "S2"), ("S2", "S3"), ("S3", "S4"), ("S4", "S5")] {
            data = data.with_transition(TransitionSpec::new(from, to, "auto").automatic());
        }
        let def = install(&f, data);

        let app = ApplicationId::new("APP-1");
        let outcome = f
            .machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();
        assert!(outcome.chain_truncated);
        assert_eq!(outcome.fired.len(), 2);
        assert_eq!(
            outcome.state.current_stage_id,
            def.stage_by_name("S3").unwrap().id
        );

        // A later re-evaluation continues from where the chain stopped
        let again = f
            .machine
            .reevaluate(&app, &ApplicationContext::new())
            .unwrap();
        assert_eq!(
            again.state.current_stage_id,
            def.stage_by_name("S5").unwrap().id
        );
    }

    #[test]
    fn test_days_in_stage_chain_advances_one_hop_per_instant() {
        let f = fixture(EngineConfig::default());
        let waited = || TransitionCondition::days_in_stage(ConditionOperator::GreaterThan, 30.0);
        let def = install(
            &f,
            NewDefinition::new("Waitlist", "undergraduate")
                .with_stage(StageSpec::named("Waitlisted"))
                .with_stage(StageSpec::named("Reminded"))
                .with_stage(StageSpec::named("Expired"))
                .with_transition(
                    TransitionSpec::new("Waitlisted", "Reminded", "Remind")
                        .automatic()
                        .with_condition(waited()),
                )
                .with_transition(
                    TransitionSpec::new("Reminded", "Expired", "Expire")
                        .automatic()
                        .with_condition(waited()),
                ),
        );
        let app = ApplicationId::new("APP-1");
        let attached = f
            .machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();
        let entered = attached.state.entered_stage_at;

        let later = entered + chrono::Duration::days(31);
        let first = f
            .machine
            .reevaluate(&app, &ApplicationContext::new().at(later))
            .unwrap();
        assert_eq!(first.fired, vec![def.transitions[0].id]);
        assert_eq!(
            first.state.current_stage_id,
            def.stage_by_name("Reminded").unwrap().id
        );
        assert_eq!(first.state.entered_stage_at, later);

        // Reminded was entered at `later`, so the same instant fires nothing
        let same = f
            .machine
            .reevaluate(&app, &ApplicationContext::new().at(later))
            .unwrap();
        assert!(same.fired.is_empty());

        let expired = f
            .machine
            .reevaluate(
                &app,
                &ApplicationContext::new().at(later + chrono::Duration::days(31)),
            )
            .unwrap();
        assert_eq!(expired.fired, vec![def.transitions[1].id]);
        assert_eq!(
            expired.state.current_stage_id,
            def.stage_by_name("Expired").unwrap().id
        );
    }

    #[test]
    fn test_lowest_id_automatic_transition_wins() {
        let f = fixture(EngineConfig::default());
        let def = install(
            &f,
            NewDefinition::new("Fork", "undergraduate")
                .with_stage(StageSpec::named("Start"))
                .with_stage(StageSpec::named("Left"))
                .with_stage(StageSpec::named("Right"))
                .with_transition(TransitionSpec::new("Start", "Left", "left").automatic())
                .with_transition(TransitionSpec::new("Start", "Right", "right").automatic()),
        );
        let app = ApplicationId::new("APP-1");
        let outcome = f
            .machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();
        assert_eq!(outcome.fired, vec![def.transitions[0].id]);
        assert_eq!(
            outcome.state.current_stage_id,
            def.stage_by_name("Left").unwrap().id
        );
    }

    #[test]
    fn test_reevaluate_without_change_commits_nothing() {
        let f = fixture(EngineConfig::default());
        install(&f, ug_2024());
        let app = ApplicationId::new("APP-1");
        f.machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();
        let audit_len = f.store.audit().len();
        let version = f.machine.state(&app).unwrap().version;

        let outcome = f
            .machine
            .reevaluate(&app, &ApplicationContext::new())
            .unwrap();
        assert!(outcome.fired.is_empty());
        assert_eq!(f.store.audit().len(), audit_len);
        assert_eq!(f.machine.state(&app).unwrap().version, version);
    }

    #[test]
    fn test_pinned_revision_survives_redefinition() {
        let f = fixture(EngineConfig::default());
        let def = install(&f, ug_2024());
        let app = ApplicationId::new("APP-1");
        f.machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();

        // Retire and restructure the definition while the application is in flight
        f.definitions.deactivate(def.id, &admin()).unwrap();
        let docs = def.stage_by_name("DocsVerified").unwrap().id;
        f.definitions.delete_stage(docs, &admin()).unwrap();

        let outcome = f
            .machine
            .request_manual_transition(
                &app,
                def.transitions[0].id,
                &reviewer(),
                &ApplicationContext::new(),
            )
            .unwrap();
        assert_eq!(outcome.state.current_stage_id, docs);
        assert_eq!(outcome.state.definition_revision, def.revision);
    }

    #[test]
    fn test_eligible_transitions() {
        let f = fixture(EngineConfig::default());
        install(&f, ug_2024());
        let app = ApplicationId::new("APP-1");
        f.machine
            .attach(&app, &category(), &admin(), &ApplicationContext::new())
            .unwrap();

        let ctx = ApplicationContext::new();
        assert_eq!(
            f.machine
                .eligible_transitions(&app, &reviewer(), &ctx)
                .unwrap()
                .len(),
            1
        );
        assert!(f
            .machine
            .eligible_transitions(&app, &Actor::new("guest"), &ctx)
            .unwrap()
            .is_empty());
    }
}
