use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

/// Headers browsers may send with cross-origin requests.
pub const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
pub const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

fn allowed_origin(state: &AppState) -> AllowOrigin {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if origins.is_empty() {
        // Wildcard; set ARENA_CORS_ORIGINS in production.
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    }
}

pub fn cors_layer(state: Arc<AppState>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origin(&state))
        .allow_headers(
            ALLOWED_HEADERS
                .split(", ")
                .map(HeaderName::from_static)
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
}

/// Answer every `OPTIONS` request with `204` and the CORS headers, before
/// routing, so pre-flights never reach a handler.
pub async fn preflight(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }

    let origin = match &state.config.cors_allowed_origins {
        None => Some(HeaderValue::from_static("*")),
        Some(_) => req
            .headers()
            .get(header::ORIGIN)
            .filter(|o| {
                let list = state.config.cors_allowed_origins.as_deref().unwrap_or_default();
                list.split(',').any(|allowed| o.as_bytes() == allowed.trim().as_bytes())
            })
            .cloned(),
    };

    let mut resp = StatusCode::NO_CONTENT.into_response();
    let headers = resp.headers_mut();
    if let Some(origin) = origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(header::VARY, HeaderValue::from_static("origin"));
    resp
}
