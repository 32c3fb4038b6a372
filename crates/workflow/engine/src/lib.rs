//! Application workflow engine runtime
//!
//! The engine moves applications through administrator-defined stage
//! graphs. Transitions are gated by data-driven conditions and role-based
//! permissions; automatic transitions fire as soon as their conditions
//! hold. Every mutation is audited in a hash-chained log.
//!
//! # Key Principle
//!
//! **The engine declares, it never delivers.** Entering a stage emits a
//! stage-entry event carrying the stage's notification triggers and
//! required documents; notification and document subsystems act on it.
//!
//! # Architecture
//!
//! The [`WorkflowOrchestrator`] composes specialized components:
//!
//! - [`WorkflowStore`]: Versioned records, pinned revisions and units of work
//! - [`DefinitionStore`]: Definition, stage and transition lifecycle
//! - [`GraphValidator`]: Structural checks run before activation
//! - [`ConditionEvaluator`]: Evaluates transition conditions against a context
//! - [`TransitionAuthorizer`]: Role gate for manual transitions
//! - [`ApplicationStateMachine`]: Attaches and advances applications
//! - [`AuditLogger`]: Append-only, hash-chained audit trail
//!
//! # Example
//!
//! ```rust
//! use workflow_engine::{EngineConfig, WorkflowOrchestrator};
//! use workflow_types::*;
//!
//! let orchestrator = WorkflowOrchestrator::new(EngineConfig::default());
//! let admin = Actor::new("registrar").with_write_access();
//!
//! let def = orchestrator
//!     .definitions()
//!     .create(
//!         NewDefinition::new("UG-2024", "undergraduate")
//!             .with_stage(StageSpec::named("Submitted"))
//!             .with_stage(StageSpec::named("Decision"))
//!             .with_transition(TransitionSpec::new("Submitted", "Decision", "Decide")),
//!         &admin,
//!     )
//!     .unwrap();
//! orchestrator.definitions().activate(def.id, &admin).unwrap();
//!
//! let app = ApplicationId::new("APP-1");
//! orchestrator
//!     .attach(
//!         &app,
//!         &ApplicationCategory::new("undergraduate"),
//!         &admin,
//!         &ApplicationContext::new(),
//!     )
//!     .unwrap();
//!
//! assert_eq!(orchestrator.get_application_state(&app).unwrap().stage.name, "Submitted");
//! ```

#![deny(unsafe_code)]

pub mod audit_logger;
pub mod condition_evaluator;
pub mod config;
pub mod definition_store;
pub mod events;
pub mod graph_validator;
pub mod orchestrator;
pub mod state_machine;
pub mod store;
pub mod transition_authorizer;

// Re-export main types
pub use audit_logger::{AuditLogger, AuditQuery, ChainVerification, QueryWindow};
pub use condition_evaluator::{ConditionEvaluator, ConditionResult, EvaluationContext};
pub use config::EngineConfig;
pub use definition_store::DefinitionStore;
pub use events::{EventBus, StageEnteredEvent};
pub use graph_validator::GraphValidator;
pub use orchestrator::{ApplicationStateView, WorkflowOrchestrator};
pub use state_machine::{ApplicationStateMachine, TransitionOutcome};
pub use store::{CommitOutcome, UnitOfWork, WorkflowStore};
pub use transition_authorizer::{AuthorizationDecision, TransitionAuthorizer};
