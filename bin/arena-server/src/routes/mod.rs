//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - Middleware layers (pre-flight answering, CORS, per-request trace id)
//! - Optional Swagger UI / OpenAPI document (disable with `ARENA_ENABLE_SWAGGER=false`)
//! - Health, summary, room and session routes
//! - Session writes behind the service key when `SERVICE_ROLE_KEY` is set

pub mod doc;
mod health;
mod rooms;
mod sessions;
mod summarize;

use std::sync::Arc;

use axum::{Router, middleware};
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{auth, cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let protected = sessions::write_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_service_key,
    ));

    let mut app = Router::new()
        .merge(health::router())
        .merge(summarize::router())
        .merge(rooms::router())
        .merge(sessions::router())
        .merge(protected);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(cors::cors_layer(state.clone()))
        .layer(middleware::from_fn_with_state(state.clone(), cors::preflight))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
