//! Liveness / readiness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::warn;
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// `200 {"status": "ok", ...}` while the database answers, `503` with
/// `"status": "degraded"` otherwise.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server and database are up", body = Value),
        (status = 503, description = "Database unreachable", body = Value)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let database_up = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "health check: database ping failed");
            false
        }
    };
    report(database_up)
}

fn report(database_up: bool) -> (StatusCode, Json<Value>) {
    let (status, label) = if database_up {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    let body = json!({
        "status":   label,
        "version":  env!("CARGO_PKG_VERSION"),
        "database": if database_up { "up" } else { "down" },
    });
    (status, Json(body))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn healthy_report_carries_version() {
        let (status, Json(body)) = report(true);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "up");
        assert!(!body["version"].as_str().unwrap_or("").is_empty());
    }

    #[test]
    fn unreachable_database_is_503() {
        let (status, Json(body)) = report(false);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
    }
}
