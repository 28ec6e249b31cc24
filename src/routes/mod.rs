//! Router assembly: HTTP endpoints, WebSocket upgrade, body limit, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (one session per connection)
/// - REST-ish API under `/api/v1/...`
/// - Body limit sized for photographed answers (base64 in JSON is ~4/3 of the image); the
///   image limit itself is enforced per image on the decoded bytes
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.limits.max_upload_bytes;
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Stateless API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/evaluate", post(http::http_post_evaluate))
        .route("/api/v1/sectionize", post(http::http_post_sectionize))
        // Session API
        .route("/api/v1/session", post(http::http_create_session))
        .route("/api/v1/session/:id", get(http::http_get_session).delete(http::http_delete_session))
        .route("/api/v1/session/:id/form", put(http::http_put_form))
        .route(
            "/api/v1/session/:id/image/:slot",
            put(http::http_put_image).delete(http::http_delete_image),
        )
        .route("/api/v1/session/:id/submit", post(http::http_post_submit))
        .route("/api/v1/session/:id/reset", post(http::http_post_reset))
        // State + limits + CORS + HTTP tracing
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes.saturating_mul(4) / 3 + 64 * 1024))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
