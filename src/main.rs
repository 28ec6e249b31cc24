//! CBSE Examiner · Grading Backend
//!
//! - Axum HTTP + WebSocket API around a per-form session state machine
//! - Gemini `generateContent` as the examiner (one call per submission, no retries)
//! - Reply sectionizer turning the examiner's text into a report
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   GEMINI_API_KEY       : examiner credential (falls back to API_KEY)
//!   GEMINI_BASE_URL      : default "https://generativelanguage.googleapis.com"
//!   GEMINI_MODEL         : default "gemini-3-pro-preview"
//!   GEMINI_TEMPERATURE   : default 0.1
//!   MAX_UPLOAD_BYTES     : largest accepted image (decoded bytes), default 20 MiB
//!   SESSION_TTL_SECS     : idle HTTP sessions are dropped after this, default 3600
//!   MAX_SESSIONS         : live sessions allowed at once, default 1000
//!   EXAMINER_CONFIG_PATH : path to TOML config (prompt overrides)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod image;
mod request;
mod gemini;
mod sectionizer;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::{spawn_session_sweeper, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (session store, Gemini client, prompts, limits).
  let state = Arc::new(AppState::new());
  let max_upload = state.limits.max_upload_bytes;

  // Drop HTTP sessions nobody came back to.
  spawn_session_sweeper(Arc::clone(&state));

  // Build the HTTP router with routes, body limit, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "examiner_backend", %addr, max_upload, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "examiner_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "examiner_backend", "Shutdown signal received");
}
