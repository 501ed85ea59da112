use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::core::shared::state::AppState;

use super::bulk::BulkActionResult;
use super::catalog::StateOption;
use super::error::LifecycleError;
use super::history::HistoryEntry;
use super::merge::MergeResult;
use super::mutation::{Mutation, MutationOutcome};
use super::store::TicketStore;
use super::types::{Actor, ActorRole, TicketId, UserId};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Caller identity forwarded by the upstream authentication layer.
/// A missing role header is treated as the least privileged role.
#[derive(Debug, Clone, Copy)]
pub struct RequestActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let reject = |msg: &str| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": msg })),
            )
        };

        let id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .ok_or_else(|| reject("missing or invalid X-Actor-Id header"))?;

        let role = match parts.headers.get(ACTOR_ROLE_HEADER) {
            None => ActorRole::Customer,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.parse::<ActorRole>().ok())
                .ok_or_else(|| reject("invalid X-Actor-Role header"))?,
        };

        Ok(RequestActor(Actor { id, role }))
    }
}

#[derive(Debug, Deserialize)]
pub struct ReopenRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkMutationRequest {
    pub ticket_ids: Vec<TicketId>,
    #[serde(flatten)]
    pub mutation: Mutation,
}

#[derive(Debug, Deserialize)]
pub struct BulkMergeRequest {
    pub ticket_ids: Vec<TicketId>,
    pub target_ticket_id: TicketId,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn list_states<S: TicketStore>(State(state): State<Arc<AppState<S>>>) -> Json<Vec<StateOption>> {
    Json(state.lifecycle.catalog().options())
}

pub async fn get_history<S: TicketStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<TicketId>,
) -> Result<Json<Vec<HistoryEntry>>, LifecycleError> {
    Ok(Json(state.lifecycle.history(id).await?))
}

pub async fn apply_mutation<S: TicketStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<TicketId>,
    RequestActor(actor): RequestActor,
    Json(mutation): Json<Mutation>,
) -> Result<Json<MutationOutcome>, LifecycleError> {
    Ok(Json(state.lifecycle.mutate(id, mutation, &actor).await?))
}

pub async fn request_reopen<S: TicketStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<TicketId>,
    RequestActor(actor): RequestActor,
    Json(req): Json<ReopenRequest>,
) -> Result<(StatusCode, Json<MutationOutcome>), LifecycleError> {
    let outcome = state.lifecycle.request_reopen(id, &req.reason, &actor).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn bulk_mutation<S: TicketStore>(
    State(state): State<Arc<AppState<S>>>,
    RequestActor(actor): RequestActor,
    Json(req): Json<BulkMutationRequest>,
) -> Result<Json<BulkActionResult>, LifecycleError> {
    let result = state
        .lifecycle
        .apply_to_many(&req.ticket_ids, req.mutation, &actor, None)
        .await?;
    Ok(Json(result))
}

pub async fn bulk_merge<S: TicketStore>(
    State(state): State<Arc<AppState<S>>>,
    RequestActor(actor): RequestActor,
    Json(req): Json<BulkMergeRequest>,
) -> Result<Json<MergeResult>, LifecycleError> {
    let result = state
        .lifecycle
        .merge(
            req.target_ticket_id,
            &req.ticket_ids,
            req.reason.as_deref(),
            &actor,
            None,
        )
        .await?;
    Ok(Json(result))
}

pub fn configure_ticket_lifecycle_routes<S: TicketStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/api/tickets/states", get(list_states::<S>))
        .route("/api/tickets/bulk", post(bulk_mutation::<S>))
        .route("/api/tickets/bulk/merge", post(bulk_merge::<S>))
        .route("/api/tickets/:id/history", get(get_history::<S>))
        .route("/api/tickets/:id/mutations", post(apply_mutation::<S>))
        .route("/api/tickets/:id/reopen-request", post(request_reopen::<S>))
}
