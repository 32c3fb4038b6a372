//! Error types for the workflow engine

use serde::{Deserialize, Serialize};

/// Errors that can occur in workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Definition failed validation with {} error(s)", error_count(.0))]
    ValidationFailed(Vec<ValidationIssue>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transition conditions not met: {0}")]
    ConditionNotMet(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WorkflowError {
    /// Stable, machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::ConditionNotMet(_) => "condition_not_met",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

fn error_count(issues: &[ValidationIssue]) -> usize {
    issues
        .iter()
        .filter(|i| i.severity == Severity::Error)
        .count()
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

// ── Validation Issues ────────────────────────────────────────────────

/// How serious a structural finding is
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single structural finding about a definition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Stable issue code, e.g. `unreachable_stage`
    pub code: String,
    pub message: String,
    /// Stage or transition the issue is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_id: Option<u64>,
}

impl ValidationIssue {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            referenced_id: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    pub fn referencing(mut self, id: u64) -> Self {
        self.referenced_id = Some(id);
        self
    }
}

/// Result of validating a definition's graph
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True iff there are no error-severity issues
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues.iter().any(|i| i.severity == Severity::Error);
        Self { valid, issues }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    /// Convert an invalid report into `ValidationFailed`
    pub fn into_result(self) -> WorkflowResult<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(WorkflowError::ValidationFailed(self.issues))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_validity_ignores_warnings() {
        let report = ValidationReport::from_issues(vec![
            ValidationIssue::warning("dead_end_stage", "ends early").referencing(3),
            ValidationIssue::info("loop_back", "cycle with exit"),
        ]);
        assert!(report.valid);
        assert_eq!(report.warnings().count(), 1);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_invalid_report_becomes_validation_failed() {
        let report = ValidationReport::from_issues(vec![ValidationIssue::error(
            "no_stages",
            "definition has no stages",
        )]);
        assert!(!report.valid);
        assert!(report.has_code("no_stages"));

        let err = report.into_result().unwrap_err();
        assert_eq!(err.kind(), "validation_failed");
        assert_eq!(err.to_string(), "Definition failed validation with 1 error(s)");
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(WorkflowError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(WorkflowError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(
            WorkflowError::ConditionNotMet("x".into()).kind(),
            "condition_not_met"
        );
        let err: WorkflowError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), "serialization");
    }
}
