//! Definition store: administrative lifecycle of workflow definitions
//!
//! Every mutation runs as one unit of work with its audit entries, so it is
//! either fully applied or not at all. Active definitions are structurally
//! frozen; activation swaps the category's live definition atomically under
//! the category's single-writer lock.

use crate::graph_validator::GraphValidator;
use crate::store::WorkflowStore;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use workflow_types::{
    Actor, ApplicationCategory, AuditAction, AuditAppend, AuditEntity, DefinitionFilter,
    DefinitionId, DefinitionPatch, NewDefinition, NewStage, Stage, StageId, StagePatch, StageRef,
    StageSpec, Transition, TransitionId, TransitionPatch, TransitionSpec, ValidationReport,
    WorkflowDefinition, WorkflowError, WorkflowResult,
};

/// Which definition a structural edit applies to
#[derive(Clone, Copy, Debug)]
enum EditTarget {
    Definition(DefinitionId),
    Stage(StageId),
    Transition(TransitionId),
}

/// Result of one structural edit, before it is audited
struct StructuralChange<T> {
    value: T,
    action: AuditAction,
    entity: AuditEntity,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
}

/// Stores, mutates and activates workflow definitions
#[derive(Clone, Debug)]
pub struct DefinitionStore {
    store: Arc<WorkflowStore>,
    validator: GraphValidator,
}

impl DefinitionStore {
    pub fn new(store: Arc<WorkflowStore>) -> Self {
        Self {
            store,
            validator: GraphValidator::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Definitions matching a filter, ascending id
    pub fn list(&self, filter: &DefinitionFilter) -> WorkflowResult<Vec<WorkflowDefinition>> {
        Ok(self
            .store
            .definitions()?
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect())
    }

    pub fn get(&self, id: DefinitionId) -> WorkflowResult<WorkflowDefinition> {
        self.store.definition(id)
    }

    /// The live definition for a category
    pub fn active_for(&self, category: &ApplicationCategory) -> WorkflowResult<WorkflowDefinition> {
        self.store
            .definitions()?
            .into_iter()
            .find(|d| d.active && d.category == *category)
            .ok_or_else(|| {
                WorkflowError::NotFound(format!("no active definition for category {}", category))
            })
    }

    pub fn validate(&self, id: DefinitionId) -> WorkflowResult<ValidationReport> {
        Ok(self.validator.validate(&self.store.definition(id)?))
    }

    /// Document types the document subsystem must hold for a stage
    pub fn required_documents(&self, stage_id: StageId) -> WorkflowResult<BTreeSet<String>> {
        self.store
            .definitions()?
            .iter()
            .find_map(|d| d.required_documents(stage_id).cloned())
            .ok_or_else(|| WorkflowError::NotFound(format!("stage {}", stage_id)))
    }

    // ── Definition lifecycle ─────────────────────────────────────────

    /// Create a new, inactive definition
    pub fn create(&self, data: NewDefinition, actor: &Actor) -> WorkflowResult<WorkflowDefinition> {
        require_writer(actor)?;
        let name = require_name(&data.name, "definition")?;
        if data.category.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "definition category must not be empty".into(),
            ));
        }
        if data.stages.iter().any(|s| s.id.is_some())
            || data.transitions.iter().any(|t| t.id.is_some())
        {
            return Err(WorkflowError::InvalidInput(
                "ids are assigned by the store on create".into(),
            ));
        }

        let id = self.store.allocate_definition_id();
        let mut definition = WorkflowDefinition::new(id, name, data.category, &actor.id)
            .with_description(data.description);
        self.replace_graph(&mut definition, Some(data.stages), Some(data.transitions))?;

        let ((), outcome) = self.store.transact("create", |unit| {
            unit.put_definition(definition.clone());
            unit.record(
                AuditAppend::new(&actor.id, AuditAction::Create, AuditEntity::Definition(id))
                    .with_after(snapshot(&definition)?),
            );
            Ok(())
        })?;

        let created = outcome.definition(id)?;
        tracing::info!(
            definition_id = %id,
            category = %created.category,
            stages = created.stage_count(),
            actor = %actor.id,
            "Workflow definition created"
        );
        Ok(created)
    }

    /// Apply a patch; structural changes are rejected while active
    pub fn update(
        &self,
        id: DefinitionId,
        patch: DefinitionPatch,
        actor: &Actor,
    ) -> WorkflowResult<WorkflowDefinition> {
        require_writer(actor)?;
        if patch.is_empty() {
            return self.get(id);
        }

        let ((), outcome) = self.store.transact("update", |unit| {
            let before = unit.definition(id)?;
            let structural = patch.is_structural_for(&before);
            if structural && before.active {
                return Err(WorkflowError::Conflict(format!(
                    "definition {} is active; deactivate it before changing its structure",
                    id
                )));
            }

            let mut after = before.clone();
            if let Some(name) = &patch.name {
                after.name = require_name(name, "definition")?;
            }
            if let Some(description) = &patch.description {
                after.description = description.clone();
            }
            if let Some(category) = &patch.category {
                if category.is_empty() {
                    return Err(WorkflowError::InvalidInput(
                        "definition category must not be empty".into(),
                    ));
                }
                after.category = category.clone();
            }
            self.replace_graph(&mut after, patch.stages.clone(), patch.transitions.clone())?;
            if structural {
                after.revision += 1;
            }
            after.updated_at = Utc::now();

            unit.record(
                AuditAppend::new(&actor.id, AuditAction::Update, AuditEntity::Definition(id))
                    .with_before(snapshot(&before)?)
                    .with_after(snapshot(&after)?),
            );
            unit.put_definition(after);
            Ok(())
        })?;

        let updated = outcome.definition(id)?;
        tracing::info!(
            definition_id = %id,
            revision = updated.revision,
            actor = %actor.id,
            "Workflow definition updated"
        );
        Ok(updated)
    }

    /// Delete an inactive definition no application is pinned to
    pub fn delete(&self, id: DefinitionId, actor: &Actor) -> WorkflowResult<()> {
        require_writer(actor)?;
        self.store.transact("delete", |unit| {
            let definition = unit.definition(id)?;
            if definition.active {
                return Err(WorkflowError::Conflict(format!(
                    "definition {} is active and cannot be deleted",
                    id
                )));
            }
            if unit.has_applications_for(id)? {
                return Err(WorkflowError::Conflict(format!(
                    "definition {} is referenced by in-flight applications",
                    id
                )));
            }
            unit.delete_definition(id);
            unit.record(
                AuditAppend::new(&actor.id, AuditAction::Delete, AuditEntity::Definition(id))
                    .with_before(snapshot(&definition)?),
            );
            Ok(())
        })?;

        tracing::info!(definition_id = %id, actor = %actor.id, "Workflow definition deleted");
        Ok(())
    }

    /// Make a definition its category's live one, retiring the previous one
    ///
    /// Activating an already-active definition is a no-op.
    pub fn activate(&self, id: DefinitionId, actor: &Actor) -> WorkflowResult<WorkflowDefinition> {
        require_writer(actor)?;
        let category = self.store.definition(id)?.category;

        self.store.with_category_lock(&category, || {
            let (replaced, outcome) = self.store.transact("activate", |unit| {
                let mut definition = unit.definition(id)?;
                if definition.category != category {
                    return Err(WorkflowError::Conflict(format!(
                        "definition {} changed category during activation",
                        id
                    )));
                }
                if definition.active {
                    return Ok(None);
                }
                self.validator.validate(&definition).into_result()?;

                let now = Utc::now();
                let mut replaced = Vec::new();
                let current_active = unit
                    .definitions()?
                    .into_iter()
                    .filter(|d| d.active && d.category == category && d.id != id);
                for mut previous in current_active {
                    let before = snapshot(&previous)?;
                    previous.active = false;
                    previous.updated_at = now;
                    unit.record(
                        AuditAppend::new(
                            &actor.id,
                            AuditAction::Deactivate,
                            AuditEntity::Definition(previous.id),
                        )
                        .with_before(before)
                        .with_after(snapshot(&previous)?)
                        .with_detail(json!({
                            "replaced_by": id,
                            "replacement_name": definition.name,
                        })),
                    );
                    replaced.push(previous.id);
                    unit.put_definition(previous);
                }

                let before = snapshot(&definition)?;
                definition.active = true;
                definition.updated_at = now;
                unit.record(
                    AuditAppend::new(&actor.id, AuditAction::Activate, AuditEntity::Definition(id))
                        .with_before(before)
                        .with_after(snapshot(&definition)?)
                        .with_detail(json!({ "replaces": replaced })),
                );
                unit.put_definition(definition);
                Ok(Some(replaced))
            })?;

            match replaced {
                Some(replaced) => {
                    tracing::info!(
                        definition_id = %id,
                        category = %category,
                        replaced = ?replaced,
                        actor = %actor.id,
                        "Workflow definition activated"
                    );
                    outcome.definition(id)
                }
                None => {
                    tracing::debug!(definition_id = %id, "Definition already active");
                    self.store.definition(id)
                }
            }
        })
    }

    /// Take a definition out of service; in-flight applications stay pinned
    pub fn deactivate(&self, id: DefinitionId, actor: &Actor) -> WorkflowResult<WorkflowDefinition> {
        require_writer(actor)?;
        let category = self.store.definition(id)?.category;

        self.store.with_category_lock(&category, || {
            let (changed, outcome) = self.store.transact("deactivate", |unit| {
                let mut definition = unit.definition(id)?;
                if !definition.active {
                    return Ok(false);
                }
                let before = snapshot(&definition)?;
                definition.active = false;
                definition.updated_at = Utc::now();
                unit.record(
                    AuditAppend::new(&actor.id, AuditAction::Deactivate, AuditEntity::Definition(id))
                        .with_before(before)
                        .with_after(snapshot(&definition)?),
                );
                unit.put_definition(definition);
                Ok(true)
            })?;

            if changed {
                tracing::info!(definition_id = %id, actor = %actor.id, "Workflow definition deactivated");
                outcome.definition(id)
            } else {
                self.store.definition(id)
            }
        })
    }

    /// Deep-copy a definition under a new name; the copy is inactive
    pub fn duplicate(
        &self,
        id: DefinitionId,
        new_name: &str,
        actor: &Actor,
    ) -> WorkflowResult<WorkflowDefinition> {
        require_writer(actor)?;
        let name = require_name(new_name, "definition")?;

        let (copy_id, outcome) = self.store.transact("duplicate", |unit| {
            let source = unit.definition(id)?;
            let copy_id = self.store.allocate_definition_id();
            let mut copy =
                WorkflowDefinition::new(copy_id, name.clone(), source.category.clone(), &actor.id)
                    .with_description(source.description.clone());

            let mut stage_map: HashMap<StageId, StageId> = HashMap::new();
            for stage in &source.stages {
                let mut cloned = stage.clone();
                cloned.id = self.store.allocate_stage_id();
                cloned.definition_id = copy_id;
                stage_map.insert(stage.id, cloned.id);
                copy.stages.push(cloned);
            }
            for transition in &source.transitions {
                let (Some(source_stage), Some(target_stage)) = (
                    stage_map.get(&transition.source),
                    stage_map.get(&transition.target),
                ) else {
                    return Err(WorkflowError::InvariantViolation(format!(
                        "transition {} references a stage outside definition {}",
                        transition.id, id
                    )));
                };
                let mut cloned = transition.clone();
                cloned.id = self.store.allocate_transition_id();
                cloned.definition_id = copy_id;
                cloned.source = *source_stage;
                cloned.target = *target_stage;
                copy.transitions.push(cloned);
            }
            copy.normalize_order();

            unit.record(
                AuditAppend::new(&actor.id, AuditAction::Duplicate, AuditEntity::Definition(copy_id))
                    .with_after(snapshot(&copy)?)
                    .with_detail(json!({
                        "source_id": id,
                        "source_name": source.name,
                    })),
            );
            unit.put_definition(copy);
            Ok(copy_id)
        })?;

        tracing::info!(
            definition_id = %copy_id,
            source_id = %id,
            actor = %actor.id,
            "Workflow definition duplicated"
        );
        outcome.definition(copy_id)
    }

    // ── Stages ───────────────────────────────────────────────────────

    /// Append a stage, or insert it at `position` shifting later stages
    pub fn add_stage(
        &self,
        definition_id: DefinitionId,
        request: NewStage,
        actor: &Actor,
    ) -> WorkflowResult<Stage> {
        let (stage, _) = self.edit_structure(
            "add_stage",
            EditTarget::Definition(definition_id),
            actor,
            |def| {
                let count = def.stages.len() as u32;
                let position = request.position.unwrap_or(count + 1);
                if position == 0 || position > count + 1 {
                    return Err(WorkflowError::InvalidInput(format!(
                        "position {} is outside 1..={}",
                        position,
                        count + 1
                    )));
                }
                let mut stage = Stage::new(
                    self.store.allocate_stage_id(),
                    def.id,
                    require_name(&request.stage.name, "stage")?,
                    position,
                );
                apply_stage_spec(&mut stage, request.stage.clone());

                for existing in def.stages.iter_mut().filter(|s| s.sequence >= position) {
                    existing.sequence += 1;
                }
                def.stages.push(stage.clone());

                Ok(StructuralChange {
                    action: AuditAction::StageCreate,
                    entity: AuditEntity::Stage(stage.id),
                    before: None,
                    after: Some(snapshot(&stage)?),
                    value: stage,
                })
            },
        )?;
        Ok(stage)
    }

    pub fn update_stage(
        &self,
        stage_id: StageId,
        patch: StagePatch,
        actor: &Actor,
    ) -> WorkflowResult<Stage> {
        let (stage, _) =
            self.edit_structure("update_stage", EditTarget::Stage(stage_id), actor, |def| {
                let stage = def
                    .stage_mut(stage_id)
                    .ok_or_else(|| WorkflowError::NotFound(format!("stage {}", stage_id)))?;
                let before = snapshot(&*stage)?;

                if let Some(name) = &patch.name {
                    stage.name = require_name(name, "stage")?;
                }
                if let Some(description) = &patch.description {
                    stage.description = description.clone();
                }
                if let Some(documents) = &patch.required_documents {
                    stage.required_documents = documents.clone();
                }
                if let Some(actions) = &patch.required_actions {
                    stage.required_actions = actions.clone();
                }
                if let Some(triggers) = &patch.notification_triggers {
                    stage.notification_triggers = triggers.clone();
                }
                if patch.clear_assigned_role {
                    stage.assigned_role = None;
                } else if let Some(role) = &patch.assigned_role {
                    stage.assigned_role = Some(role.clone());
                }

                Ok(StructuralChange {
                    action: AuditAction::StageUpdate,
                    entity: AuditEntity::Stage(stage_id),
                    before: Some(before),
                    after: Some(snapshot(&*stage)?),
                    value: stage.clone(),
                })
            })?;
        Ok(stage)
    }

    /// Remove a stage and every transition touching it, closing the sequence gap
    pub fn delete_stage(&self, stage_id: StageId, actor: &Actor) -> WorkflowResult<()> {
        self.edit_structure("delete_stage", EditTarget::Stage(stage_id), actor, |def| {
            let stage = def
                .stage(stage_id)
                .cloned()
                .ok_or_else(|| WorkflowError::NotFound(format!("stage {}", stage_id)))?;
            let removed: Vec<Transition> = def
                .transitions
                .iter()
                .filter(|t| t.connects(stage_id))
                .cloned()
                .collect();

            def.stages.retain(|s| s.id != stage_id);
            def.transitions.retain(|t| !t.connects(stage_id));
            def.resequence();

            Ok(StructuralChange {
                value: (),
                action: AuditAction::StageDelete,
                entity: AuditEntity::Stage(stage_id),
                before: Some(json!({
                    "stage": snapshot(&stage)?,
                    "removed_transitions": snapshot(&removed)?,
                })),
                after: None,
            })
        })?;
        Ok(())
    }

    /// Set sequences 1..N in the given order; the list must be a permutation
    pub fn reorder_stages(
        &self,
        definition_id: DefinitionId,
        ordered_stage_ids: &[StageId],
        actor: &Actor,
    ) -> WorkflowResult<WorkflowDefinition> {
        let ((), definition) = self.edit_structure(
            "reorder_stages",
            EditTarget::Definition(definition_id),
            actor,
            |def| {
                let requested: HashSet<StageId> = ordered_stage_ids.iter().copied().collect();
                if requested.len() != ordered_stage_ids.len()
                    || requested != def.stage_ids()
                {
                    return Err(WorkflowError::InvalidInput(format!(
                        "stage order must list each of the {} stages of definition {} exactly once",
                        def.stages.len(),
                        def.id
                    )));
                }

                let before: Vec<StageId> = def.stages.iter().map(|s| s.id).collect();
                for (index, id) in ordered_stage_ids.iter().enumerate() {
                    if let Some(stage) = def.stage_mut(*id) {
                        stage.sequence = index as u32 + 1;
                    }
                }

                Ok(StructuralChange {
                    value: (),
                    action: AuditAction::StageReorder,
                    entity: AuditEntity::Definition(def.id),
                    before: Some(json!({ "order": before })),
                    after: Some(json!({ "order": ordered_stage_ids })),
                })
            },
        )?;
        Ok(definition)
    }

    // ── Transitions ──────────────────────────────────────────────────

    pub fn add_transition(
        &self,
        definition_id: DefinitionId,
        spec: TransitionSpec,
        actor: &Actor,
    ) -> WorkflowResult<Transition> {
        let (transition, _) = self.edit_structure(
            "add_transition",
            EditTarget::Definition(definition_id),
            actor,
            |def| {
                let transition =
                    build_transition(def, self.store.allocate_transition_id(), spec.clone())?;
                def.transitions.push(transition.clone());
                Ok(StructuralChange {
                    action: AuditAction::TransitionCreate,
                    entity: AuditEntity::Transition(transition.id),
                    before: None,
                    after: Some(snapshot(&transition)?),
                    value: transition,
                })
            },
        )?;
        Ok(transition)
    }

    pub fn update_transition(
        &self,
        transition_id: TransitionId,
        patch: TransitionPatch,
        actor: &Actor,
    ) -> WorkflowResult<Transition> {
        let (transition, _) = self.edit_structure(
            "update_transition",
            EditTarget::Transition(transition_id),
            actor,
            |def| {
                let current = def.transition(transition_id).cloned().ok_or_else(|| {
                    WorkflowError::NotFound(format!("transition {}", transition_id))
                })?;

                let mut next = current.clone();
                if let Some(name) = &patch.name {
                    next.name = require_name(name, "transition")?;
                }
                if let Some(description) = &patch.description {
                    next.description = description.clone();
                }
                if let Some(source) = &patch.source {
                    next.source = resolve_stage(def, source)?;
                }
                if let Some(target) = &patch.target {
                    next.target = resolve_stage(def, target)?;
                }
                if next.is_self_loop() {
                    return Err(WorkflowError::InvalidInput(format!(
                        "transition '{}' cannot start and end at the same stage",
                        next.name
                    )));
                }
                if let Some(conditions) = &patch.conditions {
                    next.conditions = conditions.clone();
                }
                if let Some(permissions) = &patch.required_permissions {
                    next.required_permissions = permissions.clone();
                }
                if let Some(is_automatic) = patch.is_automatic {
                    next.is_automatic = is_automatic;
                }

                if let Some(slot) = def.transition_mut(transition_id) {
                    *slot = next.clone();
                }
                Ok(StructuralChange {
                    action: AuditAction::TransitionUpdate,
                    entity: AuditEntity::Transition(transition_id),
                    before: Some(snapshot(&current)?),
                    after: Some(snapshot(&next)?),
                    value: next,
                })
            },
        )?;
        Ok(transition)
    }

    pub fn delete_transition(&self, transition_id: TransitionId, actor: &Actor) -> WorkflowResult<()> {
        self.edit_structure(
            "delete_transition",
            EditTarget::Transition(transition_id),
            actor,
            |def| {
                let current = def.transition(transition_id).cloned().ok_or_else(|| {
                    WorkflowError::NotFound(format!("transition {}", transition_id))
                })?;
                def.transitions.retain(|t| t.id != transition_id);
                Ok(StructuralChange {
                    value: (),
                    action: AuditAction::TransitionDelete,
                    entity: AuditEntity::Transition(transition_id),
                    before: Some(snapshot(&current)?),
                    after: None,
                })
            },
        )?;
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Run a structural edit on an inactive definition as one audited unit
    fn edit_structure<T>(
        &self,
        operation: &str,
        target: EditTarget,
        actor: &Actor,
        mut edit: impl FnMut(&mut WorkflowDefinition) -> WorkflowResult<StructuralChange<T>>,
    ) -> WorkflowResult<(T, WorkflowDefinition)> {
        require_writer(actor)?;

        let ((value, definition_id), outcome) = self.store.transact(operation, |unit| {
            let mut definition = match target {
                EditTarget::Definition(id) => unit.definition(id)?,
                EditTarget::Stage(id) => unit.definition_for_stage(id)?,
                EditTarget::Transition(id) => unit.definition_for_transition(id)?,
            };
            if definition.active {
                return Err(WorkflowError::Conflict(format!(
                    "definition {} is active; {} requires deactivating it first",
                    definition.id, operation
                )));
            }

            let change = edit(&mut definition)?;
            definition.revision += 1;
            definition.updated_at = Utc::now();
            definition.normalize_order();

            let definition_id = definition.id;
            let mut event = AuditAppend::new(&actor.id, change.action, change.entity).with_detail(
                json!({ "definition_id": definition_id, "revision": definition.revision }),
            );
            event.before = change.before;
            event.after = change.after;
            unit.record(event);
            unit.put_definition(definition);
            Ok((change.value, definition_id))
        })?;

        let definition = outcome.definition(definition_id)?;
        tracing::info!(
            definition_id = %definition_id,
            operation,
            revision = definition.revision,
            actor = %actor.id,
            "Definition structure changed"
        );
        Ok((value, definition))
    }

    /// Replace stages and/or transitions wholesale
    ///
    /// Entries carrying an id update the existing record, others are
    /// created, and records left out are removed. Replacing stages without
    /// replacing transitions drops transitions that touch removed stages.
    fn replace_graph(
        &self,
        definition: &mut WorkflowDefinition,
        stages: Option<Vec<StageSpec>>,
        transitions: Option<Vec<TransitionSpec>>,
    ) -> WorkflowResult<()> {
        let existing_transitions: HashSet<TransitionId> =
            definition.transitions.iter().map(|t| t.id).collect();

        if let Some(specs) = stages {
            let mut seen = HashSet::new();
            let mut next = Vec::with_capacity(specs.len());
            for (index, spec) in specs.into_iter().enumerate() {
                let id = match spec.id {
                    Some(id) if definition.stage(id).is_some() => id,
                    Some(id) => {
                        return Err(WorkflowError::InvalidInput(format!(
                            "stage {} is not part of definition {}",
                            id, definition.id
                        )))
                    }
                    None => self.store.allocate_stage_id(),
                };
                if !seen.insert(id) {
                    return Err(WorkflowError::InvalidInput(format!(
                        "stage {} listed twice",
                        id
                    )));
                }
                let mut stage = Stage::new(
                    id,
                    definition.id,
                    require_name(&spec.name, "stage")?,
                    index as u32 + 1,
                );
                apply_stage_spec(&mut stage, spec);
                next.push(stage);
            }
            definition.stages = next;
            let ids = definition.stage_ids();
            definition
                .transitions
                .retain(|t| ids.contains(&t.source) && ids.contains(&t.target));
        }

        if let Some(specs) = transitions {
            let mut seen = HashSet::new();
            let mut next = Vec::with_capacity(specs.len());
            for spec in specs {
                let id = match spec.id {
                    Some(id) if existing_transitions.contains(&id) => id,
                    Some(id) => {
                        return Err(WorkflowError::InvalidInput(format!(
                            "transition {} is not part of definition {}",
                            id, definition.id
                        )))
                    }
                    None => self.store.allocate_transition_id(),
                };
                if !seen.insert(id) {
                    return Err(WorkflowError::InvalidInput(format!(
                        "transition {} listed twice",
                        id
                    )));
                }
                next.push(build_transition(definition, id, spec)?);
            }
            definition.transitions = next;
        }

        definition.normalize_order();
        Ok(())
    }
}

/// Administrative writes need an identified actor with write access
fn require_writer(actor: &Actor) -> WorkflowResult<()> {
    if actor.id.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("actor identity is required".into()));
    }
    if !actor.write_access {
        return Err(WorkflowError::Unauthorized(format!(
            "actor '{}' has no write access",
            actor.id
        )));
    }
    Ok(())
}

fn require_name(name: &str, what: &str) -> WorkflowResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::InvalidInput(format!(
            "{} name must not be empty",
            what
        )));
    }
    Ok(trimmed.to_string())
}

fn snapshot<T: Serialize + ?Sized>(value: &T) -> WorkflowResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

fn apply_stage_spec(stage: &mut Stage, spec: StageSpec) {
    stage.description = spec.description;
    stage.required_documents = spec.required_documents;
    stage.required_actions = spec.required_actions;
    stage.notification_triggers = spec.notification_triggers;
    stage.assigned_role = spec.assigned_role;
}

/// Resolve a stage reference within one definition
fn resolve_stage(definition: &WorkflowDefinition, reference: &StageRef) -> WorkflowResult<StageId> {
    match reference {
        StageRef::Id(id) => definition.stage(*id).map(|s| s.id).ok_or_else(|| {
            WorkflowError::InvalidInput(format!(
                "stage {} is not part of definition {}",
                id, definition.id
            ))
        }),
        StageRef::Name(name) => {
            let mut matches = definition.stages.iter().filter(|s| s.name == *name);
            match (matches.next(), matches.next()) {
                (Some(stage), None) => Ok(stage.id),
                (Some(_), Some(_)) => Err(WorkflowError::InvalidInput(format!(
                    "stage name '{}' is ambiguous in definition {}",
                    name, definition.id
                ))),
                (None, _) => Err(WorkflowError::InvalidInput(format!(
                    "no stage named '{}' in definition {}",
                    name, definition.id
                ))),
            }
        }
    }
}

fn build_transition(
    definition: &WorkflowDefinition,
    id: TransitionId,
    spec: TransitionSpec,
) -> WorkflowResult<Transition> {
    let source = resolve_stage(definition, &spec.source)?;
    let target = resolve_stage(definition, &spec.target)?;
    if source == target {
        return Err(WorkflowError::InvalidInput(format!(
            "transition '{}' cannot start and end at stage {}",
            spec.name, spec.source
        )));
    }
    let mut transition = Transition::new(
        id,
        definition.id,
        source,
        target,
        require_name(&spec.name, "transition")?,
    );
    transition.description = spec.description;
    transition.conditions = spec.conditions;
    transition.required_permissions = spec.required_permissions;
    transition.is_automatic = spec.is_automatic;
    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use workflow_types::{
        ApplicationId, ApplicationWorkflowState, ConditionOperator, RoleId, TransitionCondition,
    };

    fn admin() -> Actor {
        Actor::new("admin")
            .with_role(RoleId::new("admin"))
            .with_write_access()
    }

    fn make_store() -> (Arc<WorkflowStore>, DefinitionStore) {
        let store = Arc::new(WorkflowStore::default());
        (store.clone(), DefinitionStore::new(store))
    }

    fn ug_2024(name: &str) -> NewDefinition {
        NewDefinition::new(name, "undergraduate")
            .with_stage(StageSpec::named("Submitted"))
            .with_stage(StageSpec::named("DocsVerified").with_required_document("transcript"))
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

    #[test]
    fn test_create_resolves_stage_names() {
        let (store, defs) = make_store();
        let def = defs.create(ug_2024("UG-2024"), &admin()).unwrap();

        assert!(!def.active);
        assert_eq!(def.revision, 1);
        assert_eq!(def.stage_count(), 3);
        assert!(def.has_contiguous_sequence());
        let submitted = def.stage_by_name("Submitted").unwrap().id;
        assert_eq!(def.outgoing(submitted).len(), 1);
        assert_eq!(
            store.audit().by_action(AuditAction::Create).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let (_, defs) = make_store();
        let no_name = NewDefinition::new("  ", "undergraduate");
        assert!(matches!(
            defs.create(no_name, &admin()),
            Err(WorkflowError::InvalidInput(_))
        ));

        let self_loop = NewDefinition::new("Loop", "undergraduate")
            .with_stage(StageSpec::named("A"))
            .with_transition(TransitionSpec::new("A", "A", "Again"));
        assert!(matches!(
            defs.create(self_loop, &admin()),
            Err(WorkflowError::InvalidInput(_))
        ));

        let unknown = NewDefinition::new("Unknown", "undergraduate")
            .with_stage(StageSpec::named("A"))
            .with_transition(TransitionSpec::new("A", "Nowhere", "Go"));
        assert!(defs.create(unknown, &admin()).is_err());

        let read_only = Actor::new("viewer");
        assert!(matches!(
            defs.create(ug_2024("UG"), &read_only),
            Err(WorkflowError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_list_filters() {
        let (_, defs) = make_store();
        let a = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        defs.create(
            NewDefinition::new("PG Intake", "postgraduate").with_stage(StageSpec::named("Only")),
            &admin(),
        )
        .unwrap();
        defs.activate(a.id, &admin()).unwrap();

        let all = defs.list(&DefinitionFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].id < all[1].id);

        let active = defs
            .list(&DefinitionFilter {
                active: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(active.len(), 1);

        let search = defs
            .list(&DefinitionFilter {
                search: Some("pg".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].name, "PG Intake");
    }

    #[test]
    fn test_activate_swaps_active_definition() {
        let (store, defs) = make_store();
        let first = defs.create(ug_2024("UG-2023"), &admin()).unwrap();
        let second = defs.create(ug_2024("UG-2024"), &admin()).unwrap();

        defs.activate(first.id, &admin()).unwrap();
        let activated = defs.activate(second.id, &admin()).unwrap();
        assert!(activated.active);
        assert!(!defs.get(first.id).unwrap().active);

        let category = ApplicationCategory::new("undergraduate");
        assert_eq!(defs.active_for(&category).unwrap().id, second.id);

        let deactivations = store.audit().by_action(AuditAction::Deactivate).unwrap();
        assert_eq!(deactivations.len(), 1);
        assert_eq!(
            deactivations[0].detail.as_ref().unwrap()["replaced_by"],
            json!(second.id)
        );
    }

    #[test]
    fn test_activate_is_idempotent() {
        let (store, defs) = make_store();
        let def = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        defs.activate(def.id, &admin()).unwrap();
        let audit_len = store.audit().len();

        assert!(defs.activate(def.id, &admin()).unwrap().active);
        assert_eq!(store.audit().len(), audit_len);
    }

    #[test]
    fn test_activate_requires_valid_graph() {
        let (_, defs) = make_store();
        let broken = defs
            .create(
                NewDefinition::new("Broken", "undergraduate")
                    .with_stage(StageSpec::named("A"))
                    .with_stage(StageSpec::named("Orphan")),
                &admin(),
            )
            .unwrap();

        match defs.activate(broken.id, &admin()) {
            Err(WorkflowError::ValidationFailed(issues)) => {
                assert!(issues.iter().any(|i| i.code == "no_incoming_transitions"))
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
        assert!(!defs.get(broken.id).unwrap().active);
    }

    #[test]
    fn test_active_definition_is_frozen() {
        let (_, defs) = make_store();
        let def = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        defs.activate(def.id, &admin()).unwrap();

        let renamed = defs
            .update(
                def.id,
                DefinitionPatch {
                    name: Some("UG-2024 (Fall)".into()),
                    ..Default::default()
                },
                &admin(),
            )
            .unwrap();
        assert_eq!(renamed.name, "UG-2024 (Fall)");
        assert_eq!(renamed.revision, def.revision);

        let restructure = DefinitionPatch {
            stages: Some(vec![StageSpec::named("Only")]),
            ..Default::default()
        };
        assert!(matches!(
            defs.update(def.id, restructure, &admin()),
            Err(WorkflowError::Conflict(_))
        ));
        assert!(matches!(
            defs.add_stage(
                def.id,
                NewStage {
                    stage: StageSpec::named("Interview"),
                    position: None
                },
                &admin()
            ),
            Err(WorkflowError::Conflict(_))
        ));
        assert!(matches!(
            defs.delete(def.id, &admin()),
            Err(WorkflowError::Conflict(_))
        ));
    }

    #[test]
    fn test_update_replaces_graph() {
        let (_, defs) = make_store();
        let def = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        let submitted = def.stage_by_name("Submitted").unwrap().id;
        let decision = def.stage_by_name("Decision").unwrap().id;

        let patch = DefinitionPatch {
            stages: Some(vec![
                StageSpec {
                    id: Some(submitted),
                    ..StageSpec::named("Received")
                },
                StageSpec {
                    id: Some(decision),
                    ..StageSpec::named("Decision")
                },
            ]),
            transitions: Some(vec![TransitionSpec::new(submitted, decision, "Decide")]),
            ..Default::default()
        };
        let updated = defs.update(def.id, patch, &admin()).unwrap();

        assert_eq!(updated.revision, def.revision + 1);
        assert_eq!(updated.stage_count(), 2);
        assert_eq!(updated.stage(submitted).unwrap().name, "Received");
        assert_eq!(updated.transition_count(), 1);
        assert!(updated.has_contiguous_sequence());
    }

    #[test]
    fn test_add_transition_rejects_foreign_stage() {
        let (store, defs) = make_store();
        let ug = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        let other = defs.create(ug_2024("UG-2025"), &admin()).unwrap();
        let audit_len = store.audit().len();

        let leak = TransitionSpec::new(
            StageRef::Id(ug.initial_stage().unwrap().id),
            StageRef::Id(other.initial_stage().unwrap().id),
            "Leak",
        );
        assert!(matches!(
            defs.add_transition(ug.id, leak, &admin()),
            Err(WorkflowError::InvalidInput(_))
        ));

        let unchanged = defs.get(ug.id).unwrap();
        assert_eq!(unchanged.revision, ug.revision);
        assert_eq!(unchanged.transitions, ug.transitions);
        assert_eq!(store.audit().len(), audit_len);
    }

    #[test]
    fn test_delete_refuses_referenced_definition() {
        let (store, defs) = make_store();
        let def = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        let initial = def.initial_stage().unwrap().id;

        let mut unit = store.begin();
        unit.pin(&def).unwrap();
        unit.put_application(ApplicationWorkflowState::start(
            ApplicationId::new("APP-1"),
            def.category.clone(),
            def.id,
            def.revision,
            initial,
            Utc::now(),
        ));
        unit.commit().unwrap();

        assert!(matches!(
            defs.delete(def.id, &admin()),
            Err(WorkflowError::Conflict(_))
        ));

        let unused = defs.create(ug_2024("Spare"), &admin()).unwrap();
        defs.delete(unused.id, &admin()).unwrap();
        assert!(matches!(
            defs.get(unused.id),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_is_isomorphic_and_inactive() {
        let (store, defs) = make_store();
        let original = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        defs.activate(original.id, &admin()).unwrap();

        let copy = defs.duplicate(original.id, "UG-2025", &admin()).unwrap();
        assert!(!copy.active);
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.stage_count(), original.stage_count());
        assert_eq!(copy.transition_count(), original.transition_count());

        for (a, b) in original.stages.iter().zip(copy.stages.iter()) {
            assert_ne!(a.id, b.id);
            assert_eq!(a.sequence, b.sequence);
            assert_eq!(a.required_documents, b.required_documents);
        }
        let seq = |def: &WorkflowDefinition, id: StageId| def.stage(id).unwrap().sequence;
        for (a, b) in original.transitions.iter().zip(copy.transitions.iter()) {
            assert_eq!(seq(&original, a.source), seq(&copy, b.source));
            assert_eq!(seq(&original, a.target), seq(&copy, b.target));
            assert_eq!(a.is_automatic, b.is_automatic);
        }

        let entry = store.audit().by_action(AuditAction::Duplicate).unwrap();
        assert_eq!(
            entry[0].detail.as_ref().unwrap()["source_name"],
            json!("UG-2024")
        );
    }

    #[test]
    fn test_stage_insert_delete_and_reorder() {
        let (store, defs) = make_store();
        let def = defs.create(ug_2024("UG-2024"), &admin()).unwrap();

        let interview = defs
            .add_stage(
                def.id,
                NewStage {
                    stage: StageSpec::named("Interview"),
                    position: Some(2),
                },
                &admin(),
            )
            .unwrap();
        assert_eq!(interview.sequence, 2);
        let def = defs.get(def.id).unwrap();
        let names: Vec<_> = def.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Submitted", "Interview", "DocsVerified", "Decision"]);

        let docs = def.stage_by_name("DocsVerified").unwrap().id;
        defs.delete_stage(docs, &admin()).unwrap();
        let def = defs.get(def.id).unwrap();
        assert!(def.has_contiguous_sequence());
        assert_eq!(def.transition_count(), 0);

        let mut order: Vec<StageId> = def.stages.iter().map(|s| s.id).collect();
        order.reverse();
        let reordered = defs.reorder_stages(def.id, &order, &admin()).unwrap();
        assert_eq!(reordered.stages[0].name, "Decision");

        assert!(matches!(
            defs.reorder_stages(def.id, &order[1..], &admin()),
            Err(WorkflowError::InvalidInput(_))
        ));
        assert!(matches!(
            defs.add_stage(
                def.id,
                NewStage {
                    stage: StageSpec::named("Late"),
                    position: Some(9)
                },
                &admin()
            ),
            Err(WorkflowError::InvalidInput(_))
        ));

        for action in [
            AuditAction::StageCreate,
            AuditAction::StageDelete,
            AuditAction::StageReorder,
        ] {
            assert_eq!(store.audit().by_action(action).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_transition_crud() {
        let (_, defs) = make_store();
        let def = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        let submitted = def.stage_by_name("Submitted").unwrap().id;
        let decision = def.stage_by_name("Decision").unwrap().id;

        let fast_track = defs
            .add_transition(
                def.id,
                TransitionSpec::new(submitted, decision, "Fast track")
                    .requires(RoleId::new("dean")),
                &admin(),
            )
            .unwrap();
        assert!(fast_track.id > def.transitions[1].id);

        let updated = defs
            .update_transition(
                fast_track.id,
                TransitionPatch {
                    is_automatic: Some(true),
                    ..Default::default()
                },
                &admin(),
            )
            .unwrap();
        assert!(updated.is_automatic);

        let loop_patch = TransitionPatch {
            target: Some(StageRef::Id(submitted)),
            ..Default::default()
        };
        assert!(matches!(
            defs.update_transition(fast_track.id, loop_patch, &admin()),
            Err(WorkflowError::InvalidInput(_))
        ));

        defs.delete_transition(fast_track.id, &admin()).unwrap();
        assert!(defs.get(def.id).unwrap().transition(fast_track.id).is_none());
        assert!(matches!(
            defs.delete_transition(fast_track.id, &admin()),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_required_documents() {
        let (_, defs) = make_store();
        let def = defs.create(ug_2024("UG-2024"), &admin()).unwrap();
        let docs = def.stage_by_name("DocsVerified").unwrap().id;
        assert!(defs.required_documents(docs).unwrap().contains("transcript"));
        assert!(matches!(
            defs.required_documents(StageId::new(9_999)),
            Err(WorkflowError::NotFound(_))
        ));
    }

    proptest! {
        #[test]
        fn property_stage_deletion_keeps_dense_sequence(
            stage_count in 1usize..8,
            deletions in proptest::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let (_, defs) = make_store();
            let mut data = NewDefinition::new("Prop", "undergraduate");
            for i in 0..stage_count {
                data = data.with_stage(StageSpec::named(format!("S{}", i)));
            }
            let def = defs.create(data, &admin()).unwrap();
            let mut expected: Vec<String> = def.stages.iter().map(|s| s.name.clone()).collect();

            for index in deletions {
                let current = defs.get(def.id).unwrap();
                if current.stages.is_empty() {
                    break;
                }
                let victim = &current.stages[index.index(current.stages.len())];
                expected.retain(|name| *name != victim.name);
                defs.delete_stage(victim.id, &admin()).unwrap();
            }

            let after = defs.get(def.id).unwrap();
            prop_assert!(after.has_contiguous_sequence());
            let names: Vec<String> = after.stages.iter().map(|s| s.name.clone()).collect();
            prop_assert_eq!(names, expected);
        }

        #[test]
        fn property_at_most_one_active_per_category(
            ops in proptest::collection::vec((0usize..4, any::<bool>()), 1..16),
        ) {
            let (_, defs) = make_store();
            let ids: Vec<DefinitionId> = (0..4)
                .map(|i| {
                    let category = if i % 2 == 0 { "undergraduate" } else { "postgraduate" };
                    let mut data = ug_2024(&format!("D{}", i));
                    data.category = ApplicationCategory::new(category);
                    defs.create(data, &admin()).unwrap().id
                })
                .collect();

            for (index, activate) in ops {
                if activate {
                    defs.activate(ids[index], &admin()).unwrap();
                    prop_assert!(defs.get(ids[index]).unwrap().active);
                } else {
                    defs.deactivate(ids[index], &admin()).unwrap();
                }
                for category in ["undergraduate", "postgraduate"] {
                    let active = defs
                        .list(&DefinitionFilter {
                            category: Some(ApplicationCategory::new(category)),
                            active: Some(true),
                            search: None,
                        })
                        .unwrap();
                    prop_assert!(active.len() <= 1);
                }
            }
        }
    }
}
