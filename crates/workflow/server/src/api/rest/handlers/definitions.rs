//! Definition management handlers

use crate::api::rest::actor::RequestActor;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use workflow_types::{
    DefinitionFilter, DefinitionId, DefinitionPatch, NewDefinition, ValidationReport,
    WorkflowDefinition,
};

/// Duplicate definition request
#[derive(Debug, Deserialize)]
pub struct DuplicateRequest {
    pub name: String,
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// List definitions, optionally filtered
pub async fn list_definitions(
    State(state): State<AppState>,
    Query(filter): Query<DefinitionFilter>,
) -> ApiResult<Json<Vec<WorkflowDefinition>>> {
    Ok(Json(state.orchestrator.definitions().list(&filter)?))
}

/// Create a new, inactive definition
pub async fn create_definition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(request): Json<NewDefinition>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    let definition = state.orchestrator.definitions().create(request, &actor)?;
    Ok((StatusCode::CREATED, Json(definition)))
}

pub async fn get_definition(
    State(state): State<AppState>,
    Path(id): Path<DefinitionId>,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.orchestrator.definitions().get(id)?))
}

pub async fn update_definition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<DefinitionId>,
    Json(patch): Json<DefinitionPatch>,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.orchestrator.definitions().update(id, patch, &actor)?))
}

pub async fn delete_definition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<DefinitionId>,
) -> ApiResult<Json<DeleteResponse>> {
    state.orchestrator.definitions().delete(id, &actor)?;
    Ok(Json(DeleteResponse { deleted: true }))
}

pub async fn activate_definition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<DefinitionId>,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.orchestrator.definitions().activate(id, &actor)?))
}

pub async fn deactivate_definition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<DefinitionId>,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.orchestrator.definitions().deactivate(id, &actor)?))
}

pub async fn duplicate_definition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<DefinitionId>,
    Json(request): Json<DuplicateRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    let copy = state
        .orchestrator
        .definitions()
        .duplicate(id, &request.name, &actor)?;
    Ok((StatusCode::CREATED, Json(copy)))
}

/// Run the graph validator without activating
pub async fn validate_definition(
    State(state): State<AppState>,
    Path(id): Path<DefinitionId>,
) -> ApiResult<Json<ValidationReport>> {
    Ok(Json(state.orchestrator.definitions().validate(id)?))
}
