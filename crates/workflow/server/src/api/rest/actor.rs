//! Actor identity taken from request headers
//!
//! Authentication happens upstream; the gateway forwards who the caller is
//! in `x-actor-id`, `x-actor-roles` (comma separated) and
//! `x-actor-write-access`.

use crate::error::ApiError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use workflow_types::{Actor, RoleId};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLES_HEADER: &str = "x-actor-roles";
pub const ACTOR_WRITE_ACCESS_HEADER: &str = "x-actor-write-access";

/// The calling actor; id is empty when the header is absent
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| -> Result<Option<String>, ApiError> {
            parts
                .headers
                .get(name)
                .map(|value| {
                    value
                        .to_str()
                        .map(|s| s.trim().to_string())
                        .map_err(|_| ApiError::BadRequest(format!("header {} is not ASCII", name)))
                })
                .transpose()
        };

        let mut actor = Actor::new(header(ACTOR_ID_HEADER)?.unwrap_or_default());
        if let Some(roles) = header(ACTOR_ROLES_HEADER)? {
            for role in roles.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                actor = actor.with_role(RoleId::new(role));
            }
        }
        if let Some(flag) = header(ACTOR_WRITE_ACCESS_HEADER)? {
            match flag.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => actor = actor.with_write_access(),
                "false" | "0" | "no" | "" => {}
                other => {
                    return Err(ApiError::BadRequest(format!(
                        "header {} must be a boolean, got '{}'",
                        ACTOR_WRITE_ACCESS_HEADER, other
                    )))
                }
            }
        }
        Ok(RequestActor(actor))
    }
}
