//! Seed definitions loaded at startup
//!
//! A seed file lists definitions in the same shape as the create endpoint,
//! with transitions referring to stages by name, plus an `activate` flag:
//!
//! ```yaml
//! definitions:
//!   - name: UG-2024
//!     category: undergraduate
//!     activate: true
//!     stages:
//!       - name: Submitted
//!       - name: Decision
//!     transitions:
//!       - { source: Submitted, target: Decision, name: Decide }
//! ```

use crate::error::{ServerError, ServerResult};
use serde::Deserialize;
use std::path::Path;
use workflow_engine::WorkflowOrchestrator;
use workflow_types::{Actor, NewDefinition};

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub definitions: Vec<SeedDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct SeedDefinition {
    #[serde(flatten)]
    pub definition: NewDefinition,
    #[serde(default)]
    pub activate: bool,
}

impl SeedFile {
    /// Read a YAML (`.yaml`/`.yml`) or JSON seed file
    pub fn read(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml(&raw)
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| ServerError::Seed(format!("{}: {}", path.display(), e)))
        }
    }

    pub fn from_yaml(raw: &str) -> ServerResult<Self> {
        serde_yaml::from_str(raw).map_err(|e| ServerError::Seed(e.to_string()))
    }

    /// Create every definition as the system actor; returns how many were loaded
    pub fn apply(self, orchestrator: &WorkflowOrchestrator) -> ServerResult<usize> {
        let actor = Actor::system();
        let mut loaded = 0;
        for seed in self.definitions {
            let name = seed.definition.name.clone();
            let created = orchestrator
                .definitions()
                .create(seed.definition, &actor)
                .map_err(|e| ServerError::Seed(format!("definition '{}': {}", name, e)))?;
            if seed.activate {
                orchestrator
                    .definitions()
                    .activate(created.id, &actor)
                    .map_err(|e| ServerError::Seed(format!("activating '{}': {}", name, e)))?;
            }
            tracing::info!(
                definition_id = %created.id,
                name = %created.name,
                activated = seed.activate,
                "Seed definition loaded"
            );
            loaded += 1;
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_types::ApplicationCategory;

    const UG_2024: &str = r#"
definitions:
  - name: UG-2024
    category: Undergraduate
    activate: true
    stages:
      - name: Submitted
        required_documents: [transcript]
        notification_triggers:
          - event: on_enter
            recipient_roles: [applicant]
            channels: [email]
      - name: DocsVerified
      - name: Decision
    transitions:
      - source: Submitted
        target: DocsVerified
        name: Verify
        required_permissions: [reviewer]
      - source: DocsVerified
        target: Decision
        name: Auto decide
        is_automatic: true
        conditions:
          - field: { kind: document_status, document_type: transcript }
            operator: equals
            value: verified
  - name: Graduate draft
    category: graduate
    stages:
      - name: Applied
"#;

    #[test]
    fn test_yaml_seed_creates_and_activates() {
        let orch = WorkflowOrchestrator::default();
        let loaded = SeedFile::from_yaml(UG_2024).unwrap().apply(&orch).unwrap();
        assert_eq!(loaded, 2);

        let active = orch
            .get_active_definition(&ApplicationCategory::new("undergraduate"))
            .unwrap();
        assert_eq!(active.stages.len(), 3);
        assert_eq!(active.transitions.len(), 2);
        assert!(active.transitions[1].is_automatic);
        assert!(orch
            .get_active_definition(&ApplicationCategory::new("graduate"))
            .is_err());
    }

    #[test]
    fn test_shipped_seed_file_loads() {
        let orch = WorkflowOrchestrator::default();
        let seed = SeedFile::from_yaml(include_str!("../seeds/admissions.yaml")).unwrap();
        assert_eq!(seed.apply(&orch).unwrap(), 2);
        assert!(orch
            .get_active_definition(&ApplicationCategory::new("graduate"))
            .is_ok());
    }

    #[test]
    fn test_invalid_seed_reports_definition() {
        let raw = r#"
definitions:
  - name: Broken
    category: transfer
    activate: true
    stages:
      - name: A
      - name: B
"#;
        let orch = WorkflowOrchestrator::default();
        match SeedFile::from_yaml(raw).unwrap().apply(&orch) {
            Err(ServerError::Seed(msg)) => assert!(msg.contains("Broken")),
            other => panic!("expected seed error, got {:?}", other),
        }
    }
}
