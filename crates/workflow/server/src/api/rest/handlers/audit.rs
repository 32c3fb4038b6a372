//! Audit trail handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use workflow_engine::{AuditQuery, ChainVerification, QueryWindow};
use workflow_types::AuditEntry;

/// Audit listing parameters
#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
    /// `kind:id`, e.g. `definition:4` or `application:APP-1`
    pub entity: Option<String>,
    pub action: Option<String>,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl AuditParams {
    fn into_query(self) -> ApiResult<AuditQuery> {
        Ok(AuditQuery {
            entity: self
                .entity
                .map(|e| e.parse())
                .transpose()
                .map_err(ApiError::BadRequest)?,
            action: self
                .action
                .map(|a| a.parse())
                .transpose()
                .map_err(ApiError::BadRequest)?,
            window: QueryWindow::new(self.limit, self.offset),
        })
    }
}

/// Audit entries, newest first
pub async fn list_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    let query = params.into_query()?;
    Ok(Json(state.orchestrator.audit().query(&query)?))
}

pub async fn verify_audit(State(state): State<AppState>) -> ApiResult<Json<ChainVerification>> {
    Ok(Json(state.orchestrator.audit().verify()?))
}
