//! Transactional in-memory store for definitions, applications and audit
//!
//! All writes go through a [`UnitOfWork`]: reads are served from the staging
//! layer first and then from the committed state, recording the version
//! seen. [`UnitOfWork::commit`] takes the write lock once, rejects the unit
//! if any version it read has moved, re-checks store-wide invariants over
//! the resulting state, appends the staged audit entries and applies
//! everything. A unit that is dropped or fails leaves no trace.
//!
//! Single-writer sections are keyed: one lock per category (activation)
//! and one per application (transitions).

use crate::audit_logger::AuditLogger;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use workflow_types::{
    ApplicationCategory, ApplicationId, ApplicationWorkflowState, AuditAppend, AuditEntry,
    DefinitionId, StageId, TransitionId, WorkflowDefinition, WorkflowError, WorkflowResult,
};

type PinKey = (DefinitionId, u32);

#[derive(Debug, Default)]
struct StoreState {
    definitions: BTreeMap<DefinitionId, WorkflowDefinition>,
    applications: HashMap<ApplicationId, ApplicationWorkflowState>,
    pinned: HashMap<PinKey, Arc<WorkflowDefinition>>,
}

/// Keyed single-writer locks
#[derive(Debug)]
struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn get(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// The authoritative store
#[derive(Debug)]
pub struct WorkflowStore {
    state: RwLock<StoreState>,
    audit: AuditLogger,
    category_locks: KeyedLocks<ApplicationCategory>,
    application_locks: KeyedLocks<ApplicationId>,
    next_definition_id: AtomicU64,
    next_stage_id: AtomicU64,
    next_transition_id: AtomicU64,
    commit_retries: u32,
}

impl WorkflowStore {
    pub fn new(commit_retries: u32) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            audit: AuditLogger::new(),
            category_locks: KeyedLocks::new(),
            application_locks: KeyedLocks::new(),
            next_definition_id: AtomicU64::new(1),
            next_stage_id: AtomicU64::new(1),
            next_transition_id: AtomicU64::new(1),
            commit_retries,
        }
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    // ── Id allocation ────────────────────────────────────────────────

    pub fn allocate_definition_id(&self) -> DefinitionId {
        DefinitionId::new(self.next_definition_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn allocate_stage_id(&self) -> StageId {
        StageId::new(self.next_stage_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn allocate_transition_id(&self) -> TransitionId {
        TransitionId::new(self.next_transition_id.fetch_add(1, Ordering::SeqCst))
    }

    // ── Committed reads ──────────────────────────────────────────────

    pub fn definition(&self, id: DefinitionId) -> WorkflowResult<WorkflowDefinition> {
        self.read()?
            .definitions
            .get(&id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("definition {}", id)))
    }

    /// All definitions in ascending id order
    pub fn definitions(&self) -> WorkflowResult<Vec<WorkflowDefinition>> {
        Ok(self.read()?.definitions.values().cloned().collect())
    }

    pub fn application(&self, id: &ApplicationId) -> WorkflowResult<ApplicationWorkflowState> {
        self.read()?
            .applications
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("application {}", id)))
    }

    /// The immutable snapshot of a pinned definition revision
    pub fn pinned(&self, id: DefinitionId, revision: u32) -> WorkflowResult<Arc<WorkflowDefinition>> {
        self.read()?
            .pinned
            .get(&(id, revision))
            .cloned()
            .ok_or_else(|| {
                WorkflowError::NotFound(format!("definition {} revision {}", id, revision))
            })
    }

    // ── Keyed locks ──────────────────────────────────────────────────

    /// Run `f` while holding the single-writer lock for a category
    pub fn with_category_lock<T>(
        &self,
        category: &ApplicationCategory,
        f: impl FnOnce() -> WorkflowResult<T>,
    ) -> WorkflowResult<T> {
        let lock = self.category_locks.get(category);
        let _guard = lock.lock().map_err(|_| {
            WorkflowError::InvariantViolation(format!("category lock {} poisoned", category))
        })?;
        f()
    }

    /// Run `f` while holding the single-writer lock for an application
    pub fn with_application_lock<T>(
        &self,
        application_id: &ApplicationId,
        f: impl FnOnce() -> WorkflowResult<T>,
    ) -> WorkflowResult<T> {
        let lock = self.application_locks.get(application_id);
        let _guard = lock.lock().map_err(|_| {
            WorkflowError::InvariantViolation(format!(
                "application lock {} poisoned",
                application_id
            ))
        })?;
        f()
    }

    // ── Units of work ────────────────────────────────────────────────

    pub fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            store: self,
            read_definitions: HashMap::new(),
            read_applications: HashMap::new(),
            staged_definitions: BTreeMap::new(),
            staged_applications: HashMap::new(),
            staged_pins: HashMap::new(),
            audit: Vec::new(),
        }
    }

    /// Run `work` in a unit of work and commit it, retrying on version conflicts
    ///
    /// `work` must be repeatable: it is re-run from scratch on every attempt.
    pub fn transact<T>(
        &self,
        operation: &str,
        mut work: impl FnMut(&mut UnitOfWork<'_>) -> WorkflowResult<T>,
    ) -> WorkflowResult<(T, CommitOutcome)> {
        let mut attempt = 0;
        loop {
            let mut unit = self.begin();
            let value = work(&mut unit)?;
            match unit.commit() {
                Ok(outcome) => return Ok((value, outcome)),
                Err(CommitError::Failed(err)) => return Err(err),
                Err(CommitError::Stale(reason)) => {
                    if attempt >= self.commit_retries {
                        return Err(WorkflowError::Conflict(format!(
                            "{} gave up after {} attempt(s): {}",
                            operation,
                            attempt + 1,
                            reason
                        )));
                    }
                    attempt += 1;
                    tracing::warn!(operation, attempt, reason = %reason, "Retrying unit of work");
                }
            }
        }
    }

    fn read(&self) -> WorkflowResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| WorkflowError::InvariantViolation("store lock poisoned".into()))
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Why a commit did not go through
#[derive(Debug)]
pub enum CommitError {
    /// A version read by the unit changed; the unit may be retried
    Stale(String),
    /// The unit is invalid and must not be retried
    Failed(WorkflowError),
}

impl From<WorkflowError> for CommitError {
    fn from(err: WorkflowError) -> Self {
        Self::Failed(err)
    }
}

/// What a successful commit wrote
#[derive(Clone, Debug, Default)]
pub struct CommitOutcome {
    pub definitions: Vec<WorkflowDefinition>,
    pub deleted_definitions: Vec<DefinitionId>,
    pub applications: Vec<ApplicationWorkflowState>,
    pub audit: Vec<AuditEntry>,
}

impl CommitOutcome {
    pub fn definition(&self, id: DefinitionId) -> WorkflowResult<WorkflowDefinition> {
        self.definitions
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| {
                WorkflowError::InvariantViolation(format!("definition {} not in commit", id))
            })
    }

    pub fn application(&self, id: &ApplicationId) -> WorkflowResult<ApplicationWorkflowState> {
        self.applications
            .iter()
            .find(|a| a.application_id == *id)
            .cloned()
            .ok_or_else(|| {
                WorkflowError::InvariantViolation(format!("application {} not in commit", id))
            })
    }
}

/// Staged reads and writes against the store
pub struct UnitOfWork<'a> {
    store: &'a WorkflowStore,
    /// Version seen per definition; None when it did not exist
    read_definitions: HashMap<DefinitionId, Option<u64>>,
    read_applications: HashMap<ApplicationId, Option<u64>>,
    /// None marks a deletion
    staged_definitions: BTreeMap<DefinitionId, Option<WorkflowDefinition>>,
    staged_applications: HashMap<ApplicationId, ApplicationWorkflowState>,
    staged_pins: HashMap<PinKey, Arc<WorkflowDefinition>>,
    audit: Vec<AuditAppend>,
}

impl<'a> UnitOfWork<'a> {
    pub fn store(&self) -> &'a WorkflowStore {
        self.store
    }

    /// Read a definition through the staging layer
    pub fn definition(&mut self, id: DefinitionId) -> WorkflowResult<WorkflowDefinition> {
        if let Some(staged) = self.staged_definitions.get(&id) {
            return staged
                .clone()
                .ok_or_else(|| WorkflowError::NotFound(format!("definition {}", id)));
        }
        let store = self.store;
        let committed = store.read()?.definitions.get(&id).cloned();
        self.read_definitions
            .entry(id)
            .or_insert_with(|| committed.as_ref().map(|d| d.version));
        committed.ok_or_else(|| WorkflowError::NotFound(format!("definition {}", id)))
    }

    /// All definitions visible to this unit, ascending id
    pub fn definitions(&mut self) -> WorkflowResult<Vec<WorkflowDefinition>> {
        let mut merged: BTreeMap<DefinitionId, WorkflowDefinition> = BTreeMap::new();
        {
            let store = self.store;
            let guard = store.read()?;
            for (id, def) in &guard.definitions {
                self.read_definitions.entry(*id).or_insert(Some(def.version));
                merged.insert(*id, def.clone());
            }
        }
        for (id, staged) in &self.staged_definitions {
            match staged {
                Some(def) => {
                    merged.insert(*id, def.clone());
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Locate the definition owning a stage
    pub fn definition_for_stage(&mut self, stage_id: StageId) -> WorkflowResult<WorkflowDefinition> {
        self.definitions()?
            .into_iter()
            .find(|d| d.stage(stage_id).is_some())
            .ok_or_else(|| WorkflowError::NotFound(format!("stage {}", stage_id)))
    }

    /// Locate the definition owning a transition
    pub fn definition_for_transition(
        &mut self,
        transition_id: TransitionId,
    ) -> WorkflowResult<WorkflowDefinition> {
        self.definitions()?
            .into_iter()
            .find(|d| d.transition(transition_id).is_some())
            .ok_or_else(|| WorkflowError::NotFound(format!("transition {}", transition_id)))
    }

    pub fn put_definition(&mut self, definition: WorkflowDefinition) {
        self.staged_definitions
            .insert(definition.id, Some(definition));
    }

    pub fn delete_definition(&mut self, id: DefinitionId) {
        self.staged_definitions.insert(id, None);
    }

    /// Read an application through the staging layer
    pub fn application(
        &mut self,
        id: &ApplicationId,
    ) -> WorkflowResult<Option<ApplicationWorkflowState>> {
        if let Some(staged) = self.staged_applications.get(id) {
            return Ok(Some(staged.clone()));
        }
        let store = self.store;
        let committed = store.read()?.applications.get(id).cloned();
        self.read_applications
            .entry(id.clone())
            .or_insert_with(|| committed.as_ref().map(|a| a.version));
        Ok(committed)
    }

    /// Whether any application is pinned to a definition
    pub fn has_applications_for(&self, id: DefinitionId) -> WorkflowResult<bool> {
        if self
            .staged_applications
            .values()
            .any(|a| a.definition_id == id)
        {
            return Ok(true);
        }
        Ok(self
            .store
            .read()?
            .applications
            .values()
            .any(|a| a.definition_id == id))
    }

    pub fn put_application(&mut self, application: ApplicationWorkflowState) {
        self.staged_applications
            .insert(application.application_id.clone(), application);
    }

    /// Snapshot a definition's current revision for pinning
    pub fn pin(&mut self, definition: &WorkflowDefinition) -> WorkflowResult<Arc<WorkflowDefinition>> {
        let key = (definition.id, definition.revision);
        if let Some(existing) = self.staged_pins.get(&key) {
            return Ok(existing.clone());
        }
        if let Some(existing) = self.store.read()?.pinned.get(&key) {
            return Ok(existing.clone());
        }
        let snapshot = Arc::new(definition.clone());
        self.staged_pins.insert(key, snapshot.clone());
        Ok(snapshot)
    }

    /// A pinned revision, staged or committed
    pub fn pinned(&self, id: DefinitionId, revision: u32) -> WorkflowResult<Arc<WorkflowDefinition>> {
        if let Some(staged) = self.staged_pins.get(&(id, revision)) {
            return Ok(staged.clone());
        }
        self.store.pinned(id, revision)
    }

    /// Stage an audit entry
    pub fn record(&mut self, event: AuditAppend) {
        self.audit.push(event);
    }

    /// Commit all staged writes atomically
    pub fn commit(self) -> Result<CommitOutcome, CommitError> {
        let store = self.store;
        let mut state = store
            .state
            .write()
            .map_err(|_| WorkflowError::InvariantViolation("store lock poisoned".into()))?;

        // Optimistic version check
        for (id, seen) in &self.read_definitions {
            let current = state.definitions.get(id).map(|d| d.version);
            if current != *seen {
                return Err(CommitError::Stale(format!("definition {} changed", id)));
            }
        }
        for (id, seen) in &self.read_applications {
            let current = state.applications.get(id).map(|a| a.version);
            if current != *seen {
                return Err(CommitError::Stale(format!("application {} changed", id)));
            }
        }

        // Resulting definitions with bumped versions
        let mut definitions = Vec::new();
        let mut deleted = Vec::new();
        for (id, staged) in &self.staged_definitions {
            match staged {
                Some(def) => {
                    let mut def = def.clone();
                    def.version = state.definitions.get(id).map_or(1, |d| d.version + 1);
                    if let Some(previous) = state.definitions.get(id) {
                        check_frozen(previous, &def)?;
                    }
                    check_definition_structure(&def)?;
                    definitions.push(def);
                }
                None => deleted.push(*id),
            }
        }

        let mut applications = Vec::new();
        for (id, app) in &self.staged_applications {
            let mut app = app.clone();
            app.version = state.applications.get(id).map_or(1, |a| a.version + 1);
            let key = (app.definition_id, app.definition_revision);
            let pinned = self
                .staged_pins
                .get(&key)
                .or_else(|| state.pinned.get(&key))
                .ok_or_else(|| {
                    invariant(format!(
                        "application {} pinned to unknown revision {}@{}",
                        id, key.0, key.1
                    ))
                })?;
            if pinned.stage(app.current_stage_id).is_none() {
                return Err(invariant(format!(
                    "application {} points at stage {} outside its definition",
                    id, app.current_stage_id
                ))
                .into());
            }
            applications.push(app);
        }

        check_active_per_category(&state.definitions, &definitions, &deleted)?;

        for id in &deleted {
            let referenced = state
                .applications
                .values()
                .chain(applications.iter())
                .any(|a| a.definition_id == *id);
            if referenced {
                return Err(WorkflowError::Conflict(format!(
                    "definition {} is referenced by in-flight applications",
                    id
                ))
                .into());
            }
        }

        let audit = store.audit.append_batch(self.audit)?;

        for id in &deleted {
            state.definitions.remove(id);
            state.pinned.retain(|(def_id, _), _| def_id != id);
        }
        for def in &definitions {
            state.definitions.insert(def.id, def.clone());
        }
        for (key, snapshot) in self.staged_pins {
            state.pinned.entry(key).or_insert(snapshot);
        }
        for app in &applications {
            state
                .applications
                .insert(app.application_id.clone(), app.clone());
        }

        Ok(CommitOutcome {
            definitions,
            deleted_definitions: deleted,
            applications,
            audit,
        })
    }
}

fn invariant(message: String) -> WorkflowError {
    tracing::error!(message = %message, "Store invariant violated");
    WorkflowError::InvariantViolation(message)
}

/// Active definitions are structurally frozen
fn check_frozen(previous: &WorkflowDefinition, next: &WorkflowDefinition) -> WorkflowResult<()> {
    if previous.active && next.active && previous.revision != next.revision {
        return Err(invariant(format!(
            "active definition {} changed structure",
            next.id
        )));
    }
    Ok(())
}

/// Dense sequence, owned stages, same-definition transition endpoints
fn check_definition_structure(def: &WorkflowDefinition) -> WorkflowResult<()> {
    if !def.has_contiguous_sequence() {
        return Err(invariant(format!(
            "definition {} stage sequence is not 1..{}",
            def.id,
            def.stages.len()
        )));
    }

    let mut stage_ids = HashSet::new();
    for stage in &def.stages {
        if stage.definition_id != def.id || !stage_ids.insert(stage.id) {
            return Err(invariant(format!(
                "definition {} has foreign or duplicate stage {}",
                def.id, stage.id
            )));
        }
    }

    let mut transition_ids = HashSet::new();
    for t in &def.transitions {
        if t.definition_id != def.id || !transition_ids.insert(t.id) {
            return Err(invariant(format!(
                "definition {} has foreign or duplicate transition {}",
                def.id, t.id
            )));
        }
        if !stage_ids.contains(&t.source) || !stage_ids.contains(&t.target) {
            return Err(invariant(format!(
                "transition {} references a stage outside definition {}",
                t.id, def.id
            )));
        }
        if t.is_self_loop() {
            return Err(invariant(format!("transition {} is a self-loop", t.id)));
        }
    }
    Ok(())
}

/// At most one active definition per category in the resulting state
fn check_active_per_category(
    committed: &BTreeMap<DefinitionId, WorkflowDefinition>,
    staged: &[WorkflowDefinition],
    deleted: &[DefinitionId],
) -> WorkflowResult<()> {
    let touched: BTreeSet<&ApplicationCategory> = staged.iter().map(|d| &d.category).collect();
    for category in touched {
        let staged_ids: HashSet<DefinitionId> = staged.iter().map(|d| d.id).collect();
        let active_committed = committed
            .values()
            .filter(|d| !staged_ids.contains(&d.id) && !deleted.contains(&d.id))
            .filter(|d| d.active && d.category == *category)
            .count();
        let active_staged = staged
            .iter()
            .filter(|d| d.active && d.category == *category)
            .count();
        if active_committed + active_staged > 1 {
            return Err(invariant(format!(
                "category {} would have {} active definitions",
                category,
                active_committed + active_staged
            )));
        }
    }
    Ok(())
}
