//! Debate summaries.
//!
//! `POST /summarize` is the primary surface. The same handler also answers
//! at `/functions/v1/summarize-debate` for clients still calling the old
//! function URL; both accept `{"session_id": "..."}` and reply
//! `{"summary": "..."}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{any, post};
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::summarize::{SummarizeRequest, SummarizeResponse};
use crate::state::AppState;

pub const LEGACY_PATH: &str = "/functions/v1/summarize-debate";

#[derive(OpenApi)]
#[openapi(
    paths(summarize),
    components(schemas(SummarizeRequest, SummarizeResponse))
)]
pub struct SummarizeApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/summarize", post(summarize))
        .route(LEGACY_PATH, any(summarize))
}

/// Summarize a debate session's transcript and store the result on the
/// session.
///
/// An empty body is treated as `{}` and rejected for the missing id. When
/// the summary cannot be stored it is still returned.
#[utoipa::path(
    post,
    path = "/summarize",
    tag = "summaries",
    request_body = SummarizeRequest,
    responses(
        (status = 200, description = "Summary generated", body = SummarizeResponse),
        (status = 400, description = "Missing session_id, invalid JSON or empty transcript"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Generation failed or not configured"),
    )
)]
pub async fn summarize(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SummarizeResponse>, ServerError> {
    let req = parse_body(&body)?;
    let summary = state.summaries.summarize(req.session_id.as_deref()).await?;
    info!(
        model = %summary.model,
        persisted = summary.persisted,
        chars = summary.text.chars().count(),
        "summary served"
    );
    Ok(Json(SummarizeResponse { summary: summary.text }))
}

fn parse_body(body: &[u8]) -> Result<SummarizeRequest, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SummarizeRequest::default());
    }
    serde_json::from_slice(body).map_err(|_| ServerError::BadRequest("invalid JSON body".into()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
