//! Stage and transition handlers

use super::definitions::DeleteResponse;
use crate::api::rest::actor::RequestActor;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use workflow_types::{
    DefinitionId, NewStage, Stage, StageId, StagePatch, Transition, TransitionId,
    TransitionPatch, TransitionSpec, WorkflowDefinition,
};

/// Reorder request: every stage id of the definition, in the new order
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub stage_ids: Vec<StageId>,
}

/// Document contract response
#[derive(Debug, Serialize)]
pub struct RequiredDocumentsResponse {
    pub stage_id: StageId,
    pub required_documents: BTreeSet<String>,
}

// ── Stages ──────────────────────────────────────────────────────────

pub async fn add_stage(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(definition_id): Path<DefinitionId>,
    Json(request): Json<NewStage>,
) -> ApiResult<(StatusCode, Json<Stage>)> {
    let stage = state
        .orchestrator
        .definitions()
        .add_stage(definition_id, request, &actor)?;
    Ok((StatusCode::CREATED, Json(stage)))
}

pub async fn reorder_stages(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(definition_id): Path<DefinitionId>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.orchestrator.definitions().reorder_stages(
        definition_id,
        &request.stage_ids,
        &actor,
    )?))
}

pub async fn update_stage(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(stage_id): Path<StageId>,
    Json(patch): Json<StagePatch>,
) -> ApiResult<Json<Stage>> {
    Ok(Json(
        state
            .orchestrator
            .definitions()
            .update_stage(stage_id, patch, &actor)?,
    ))
}

pub async fn delete_stage(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(stage_id): Path<StageId>,
) -> ApiResult<Json<DeleteResponse>> {
    state.orchestrator.definitions().delete_stage(stage_id, &actor)?;
    Ok(Json(DeleteResponse { deleted: true }))
}

pub async fn required_documents(
    State(state): State<AppState>,
    Path(stage_id): Path<StageId>,
) -> ApiResult<Json<RequiredDocumentsResponse>> {
    let required_documents = state.orchestrator.required_documents(stage_id)?;
    Ok(Json(RequiredDocumentsResponse {
        stage_id,
        required_documents,
    }))
}

// ── Transitions ─────────────────────────────────────────────────────

pub async fn add_transition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(definition_id): Path<DefinitionId>,
    Json(spec): Json<TransitionSpec>,
) -> ApiResult<(StatusCode, Json<Transition>)> {
    let transition = state
        .orchestrator
        .definitions()
        .add_transition(definition_id, spec, &actor)?;
    Ok((StatusCode::CREATED, Json(transition)))
}

pub async fn update_transition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(transition_id): Path<TransitionId>,
    Json(patch): Json<TransitionPatch>,
) -> ApiResult<Json<Transition>> {
    Ok(Json(
        state
            .orchestrator
            .definitions()
            .update_transition(transition_id, patch, &actor)?,
    ))
}

pub async fn delete_transition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(transition_id): Path<TransitionId>,
) -> ApiResult<Json<DeleteResponse>> {
    state
        .orchestrator
        .definitions()
        .delete_transition(transition_id, &actor)?;
    Ok(Json(DeleteResponse { deleted: true }))
}
