//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are converted to a JSON body
//! `{"error": "..."}` with an appropriate status code.
//!
//! **Security note:** Internal errors (database, text generation) are logged
//! with full detail but only a generic message is returned to the caller so
//! that SQL, upstream bodies or keys never leak to clients.

use std::time::Duration;

use arena_core::llm::GenerationError;
use arena_core::{RelayError, SummaryError};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the arena-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The text-generation endpoint failed.
    #[error("upstream error: {0}")]
    Upstream(#[from] GenerationError),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong credentials.
    #[error("unauthorised: {0}")]
    Unauthorized(String),

    /// The per-user send throttle rejected the request.
    #[error("rate_limit: retry after {} ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            // Client-facing errors: expose the message directly.
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ServerError::RateLimited { retry_after } => {
                let secs = retry_after.as_millis().div_ceil(1000).max(1);
                let body = Json(json!({ "error": self.to_string() }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, secs.to_string())],
                    body,
                )
                    .into_response();
            }

            // Internal errors: log the full detail, return a generic message.
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
            ServerError::Upstream(e) => {
                error!(error = %e, "text generation failed");
                let message = match e {
                    GenerationError::NotConfigured => "summary service is not configured",
                    GenerationError::Empty => "no summary produced",
                    _ => "summary generation failed",
                };
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_owned())
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<RelayError> for ServerError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::BadRequest(m) => ServerError::BadRequest(m),
            RelayError::Unauthenticated => ServerError::Unauthorized("sign in to send messages".into()),
            RelayError::NotFound(m) => ServerError::NotFound(m),
            RelayError::RateLimited { retry_after } => ServerError::RateLimited { retry_after },
            RelayError::Database(e) => ServerError::Database(e),
        }
    }
}

impl From<SummaryError> for ServerError {
    fn from(e: SummaryError) -> Self {
        match e {
            SummaryError::BadRequest(m) => ServerError::BadRequest(m),
            SummaryError::NotFound(m) => ServerError::NotFound(m),
            SummaryError::Database(e) => ServerError::Database(e),
            SummaryError::Generation(e) => ServerError::Upstream(e),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(e: JsonRejection) -> Self {
        ServerError::BadRequest(e.body_text())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn client_errors_expose_their_message() {
        let resp = ServerError::NotFound("session s1".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "session s1");
    }

    #[tokio::test]
    async fn rate_limit_is_429_with_retry_after() {
        let resp = ServerError::from(RelayError::RateLimited { retry_after: Duration::from_millis(1200) })
            .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "2");
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("rate_limit"));
    }

    #[tokio::test]
    async fn upstream_details_stay_in_the_logs() {
        let err = ServerError::from(SummaryError::Generation(GenerationError::Status {
            status: 401,
            body: "invalid key sk-123".into(),
        }));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "summary generation failed");
    }

    #[tokio::test]
    async fn database_errors_are_generic() {
        let resp = ServerError::from(RelayError::Database(sqlx::Error::PoolClosed)).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "internal server error");
    }

    #[test]
    fn unauthenticated_send_is_401() {
        let resp = ServerError::from(RelayError::Unauthenticated).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
