//! Orchestration API handlers
//!
//! Document statuses and form data are owned by other subsystems; callers
//! pass them in as the evaluation context with each request.

use crate::api::rest::actor::RequestActor;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use workflow_engine::{ApplicationStateView, TransitionOutcome};
use workflow_types::{
    ApplicationCategory, ApplicationContext, ApplicationId, StageId, Transition, TransitionId,
    WorkflowDefinition,
};

/// Attach request
#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub application_id: ApplicationId,
    pub category: ApplicationCategory,
    #[serde(default)]
    pub context: ApplicationContext,
}

/// Manual transition request
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub transition_id: TransitionId,
    #[serde(default)]
    pub context: ApplicationContext,
}

/// Body carrying only an evaluation context
#[derive(Debug, Default, Deserialize)]
pub struct ContextRequest {
    #[serde(default)]
    pub context: ApplicationContext,
}

/// Result of a state-changing call
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub new_stage: StageId,
    #[serde(flatten)]
    pub outcome: TransitionOutcome,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            new_stage: outcome.state.current_stage_id,
            outcome,
        }
    }
}

pub async fn get_active_definition(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let category = ApplicationCategory::new(category);
    Ok(Json(state.orchestrator.get_active_definition(&category)?))
}

pub async fn attach_application(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(request): Json<AttachRequest>,
) -> ApiResult<(StatusCode, Json<TransitionResponse>)> {
    let outcome = state.orchestrator.attach(
        &request.application_id,
        &request.category,
        &actor,
        &request.context,
    )?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

pub async fn get_application_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApplicationStateView>> {
    Ok(Json(
        state
            .orchestrator
            .get_application_state(&ApplicationId::new(id))?,
    ))
}

pub async fn request_transition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    let outcome = state.orchestrator.request_transition(
        &ApplicationId::new(id),
        request.transition_id,
        &actor,
        &request.context,
    )?;
    Ok(Json(outcome.into()))
}

pub async fn eligible_transitions(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    Json(request): Json<ContextRequest>,
) -> ApiResult<Json<Vec<Transition>>> {
    Ok(Json(state.orchestrator.get_eligible_transitions(
        &ApplicationId::new(id),
        &actor,
        &request.context,
    )?))
}

/// Re-run automatic rules; intended for an external scheduler
pub async fn reevaluate_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ContextRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    let outcome = state
        .orchestrator
        .reevaluate(&ApplicationId::new(id), &request.context)?;
    Ok(Json(outcome.into()))
}
