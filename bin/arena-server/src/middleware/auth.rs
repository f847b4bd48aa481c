use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ServerError;
use crate::state::AppState;

/// Require `Authorization: Bearer <SERVICE_ROLE_KEY>` when a key is
/// configured; pass everything through otherwise.
pub async fn require_service_key(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(expected) = state.config.service_role_key.as_deref() {
        let provided = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if provided != Some(expected) {
            return ServerError::Unauthorized("unauthorised".into()).into_response();
        }
    }
    next.run(req).await
}
