//! Audit logger: append-only, hash-linked record of every mutation
//!
//! Each entry's hash covers its content plus the previous entry's hash, so
//! any edit or removal inside the log breaks the chain from that point on.
//! Entries are appended in batches; a batch is either fully appended or
//! not at all.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;
use workflow_types::{
    AuditAction, AuditAppend, AuditEntity, AuditEntry, WorkflowError, WorkflowResult,
};

/// Pagination window for newest-first listings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    /// Zero means unlimited
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl QueryWindow {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

/// Filter for audit queries
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<AuditEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<AuditAction>,
    #[serde(default)]
    pub window: QueryWindow,
}

/// Outcome of re-walking the hash chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries_checked: u64,
    /// First sequence whose link or hash does not match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_broken_sequence: Option<u64>,
}

/// Append-only audit log
#[derive(Debug, Default)]
pub struct AuditLogger {
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event
    pub fn append(&self, event: AuditAppend) -> WorkflowResult<AuditEntry> {
        let mut appended = self.append_batch(vec![event])?;
        appended
            .pop()
            .ok_or_else(|| WorkflowError::InvariantViolation("empty audit batch".into()))
    }

    /// Append events in order; nothing is appended if any entry fails to hash
    pub fn append_batch(&self, events: Vec<AuditAppend>) -> WorkflowResult<Vec<AuditEntry>> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| WorkflowError::InvariantViolation("audit lock poisoned".into()))?;

        let mut previous_hash = guard.last().map(|e| e.hash.clone());
        let mut sequence = guard.len() as u64;
        let mut prepared = Vec::with_capacity(events.len());

        for event in events {
            sequence += 1;
            let hash = compute_audit_hash(&event, previous_hash.as_deref(), sequence)?;
            let entry = AuditEntry {
                entry_id: format!("audit-{}", Uuid::new_v4()),
                sequence,
                timestamp: event.timestamp,
                actor: event.actor,
                action: event.action,
                entity: event.entity,
                before: event.before,
                after: event.after,
                detail: event.detail,
                previous_hash: previous_hash.take(),
                hash: hash.clone(),
            };
            previous_hash = Some(hash);
            prepared.push(entry);
        }

        for entry in &prepared {
            tracing::trace!(
                sequence = entry.sequence,
                action = %entry.action,
                entity = %entry.entity,
                actor = %entry.actor,
                "Audit entry appended"
            );
        }
        guard.extend(prepared.iter().cloned());
        Ok(prepared)
    }

    /// Entries matching a query, newest first
    pub fn query(&self, query: &AuditQuery) -> WorkflowResult<Vec<AuditEntry>> {
        let guard = self.read()?;
        let values = guard
            .iter()
            .rev()
            .filter(|e| query.entity.as_ref().map_or(true, |entity| e.entity == *entity))
            .filter(|e| query.action.map_or(true, |action| e.action == action))
            .cloned()
            .collect();
        Ok(apply_window(values, query.window))
    }

    /// All entries, newest first
    pub fn list(&self, window: QueryWindow) -> WorkflowResult<Vec<AuditEntry>> {
        self.query(&AuditQuery {
            window,
            ..Default::default()
        })
    }

    /// Entries about one record, oldest first
    pub fn by_entity(&self, entity: &AuditEntity) -> WorkflowResult<Vec<AuditEntry>> {
        let guard = self.read()?;
        Ok(guard.iter().filter(|e| e.entity == *entity).cloned().collect())
    }

    /// Entries with one action, oldest first
    pub fn by_action(&self, action: AuditAction) -> WorkflowResult<Vec<AuditEntry>> {
        let guard = self.read()?;
        Ok(guard.iter().filter(|e| e.action == action).cloned().collect())
    }

    pub fn latest_hash(&self) -> WorkflowResult<Option<String>> {
        Ok(self.read()?.last().map(|e| e.hash.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute every hash and link
    pub fn verify(&self) -> WorkflowResult<ChainVerification> {
        let guard = self.read()?;
        let mut previous_hash: Option<String> = None;

        for (index, entry) in guard.iter().enumerate() {
            let expected_sequence = index as u64 + 1;
            let expected_hash =
                compute_audit_hash(&entry.content(), previous_hash.as_deref(), entry.sequence)?;
            if entry.sequence != expected_sequence
                || entry.previous_hash != previous_hash
                || entry.hash != expected_hash
            {
                tracing::error!(sequence = expected_sequence, "Audit chain broken");
                return Ok(ChainVerification {
                    valid: false,
                    entries_checked: index as u64,
                    first_broken_sequence: Some(expected_sequence),
                });
            }
            previous_hash = Some(entry.hash.clone());
        }

        Ok(ChainVerification {
            valid: true,
            entries_checked: guard.len() as u64,
            first_broken_sequence: None,
        })
    }

    fn read(&self) -> WorkflowResult<std::sync::RwLockReadGuard<'_, Vec<AuditEntry>>> {
        self.entries
            .read()
            .map_err(|_| WorkflowError::InvariantViolation("audit lock poisoned".into()))
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, sequence: u64, f: impl FnOnce(&mut AuditEntry)) {
        let mut guard = self.entries.write().unwrap();
        if let Some(entry) = guard.iter_mut().find(|e| e.sequence == sequence) {
            f(entry);
        }
    }
}

fn compute_audit_hash(
    event: &AuditAppend,
    previous_hash: Option<&str>,
    sequence: u64,
) -> WorkflowResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "timestamp": event.timestamp,
        "actor": event.actor,
        "action": event.action,
        "entity": event.entity,
        "before": event.before,
        "after": event.after,
        "detail": event.detail,
    });
    let serialized = serde_json::to_vec(&serializable)?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
