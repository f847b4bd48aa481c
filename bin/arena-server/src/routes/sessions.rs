use std::sync::Arc;

use arena_core::model::{DebateSession, Turn};
use arena_core::store::DebateStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SubsecRound, Utc};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::sessions::{AppendTurnRequest, CreateSessionRequest, SessionResponse, TurnResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(create_session, get_session, append_turn),
    components(schemas(CreateSessionRequest, AppendTurnRequest, SessionResponse, TurnResponse))
)]
pub struct SessionsApi;

/// Read-only session routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/sessions/{id}", get(get_session))
}

/// Session write routes; [`super::build`] puts these behind the service key.
pub fn write_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions",            post(create_session))
        .route("/sessions/{id}/turns", post(append_turn))
}

#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Missing or wrong service key"),
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ServerError> {
    let Json(req) = payload?;
    if req.user_id.trim().is_empty() {
        return Err(ServerError::BadRequest("user_id is required".into()));
    }
    let session = DebateSession::new(
        req.user_id.trim(),
        non_blank(req.topic),
        non_blank(req.lecture_title),
        Utc::now().trunc_subsecs(6),
    );
    state.store.create_session(session.clone()).await?;
    info!(session_id = %session.id, "debate session created");
    Ok(Json(SessionResponse::new(session, Vec::new())))
}

/// A session with its transcript and any stored summary.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session found", body = SessionResponse),
        (status = 404, description = "Session not found"),
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ServerError> {
    let session = state
        .store
        .get_session(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("session {id}")))?;
    let turns = state.store.list_turns(&id).await?;
    Ok(Json(SessionResponse::new(session, turns)))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/turns",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    request_body = AppendTurnRequest,
    responses(
        (status = 200, description = "Turn appended", body = TurnResponse),
        (status = 400, description = "Empty content"),
        (status = 401, description = "Missing or wrong service key"),
        (status = 404, description = "Session not found"),
    )
)]
pub async fn append_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AppendTurnRequest>, JsonRejection>,
) -> Result<Json<TurnResponse>, ServerError> {
    let Json(req) = payload?;
    if req.content.trim().is_empty() {
        return Err(ServerError::BadRequest("content is required".into()));
    }
    if state.store.get_session(&id).await?.is_none() {
        return Err(ServerError::NotFound(format!("session {id}")));
    }
    let sender = match req.sender.trim() {
        "" => "user",
        s => s,
    };
    let turn = Turn::new(&id, sender, req.content, Utc::now().trunc_subsecs(6));
    state.store.append_turn(turn.clone()).await?;
    Ok(Json(turn.into()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
