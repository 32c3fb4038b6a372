//! Transition authorizer: may this actor manually fire this transition?

use serde::{Deserialize, Serialize};
use workflow_types::{Actor, Transition};

/// Authorization decision for a manual request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AuthorizationDecision {
    Allowed,
    Denied { reason: String },
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }
}

/// Role-based gate for manual transitions
///
/// Automatic transitions are fired by the engine and bypass this check;
/// they can never be requested manually.
#[derive(Clone, Debug, Default)]
pub struct TransitionAuthorizer;

impl TransitionAuthorizer {
    pub fn new() -> Self {
        Self
    }

    pub fn authorize(&self, transition: &Transition, actor: &Actor) -> AuthorizationDecision {
        let decision = if transition.is_automatic {
            AuthorizationDecision::denied(format!(
                "transition '{}' is automatic and cannot be requested",
                transition.name
            ))
        } else if !actor.write_access {
            AuthorizationDecision::denied(format!(
                "actor '{}' has no write access to the application",
                actor.id
            ))
        } else if transition.required_permissions.is_empty()
            || actor.has_any_role(&transition.required_permissions)
        {
            AuthorizationDecision::Allowed
        } else {
            let required: Vec<&str> = transition
                .required_permissions
                .iter()
                .map(|r| r.as_str())
                .collect();
            AuthorizationDecision::denied(format!(
                "actor '{}' lacks any of the roles [{}]",
                actor.id,
                required.join(", ")
            ))
        };

        tracing::debug!(
            transition_id = %transition.id,
            actor = %actor.id,
            allowed = decision.is_allowed(),
            "Transition authorization"
        );
        decision
    }
}
