//! Application state: prompts, limits, optional Gemini client and the in-memory session store.
//!
//! Each session holds one `ViewState`. The store lock is only held for a transition, never
//! across a model call. HTTP sessions expire after `Limits::session_ttl` without traffic;
//! WebSocket sessions live exactly as long as their connection.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::RwLock, task::JoinHandle, time::Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{limits_from_env, load_examiner_config_from_env, Limits, Prompts};
use crate::error::ApiError;
use crate::gemini::Gemini;
use crate::protocol::{to_out, SessionOut};
use crate::session::ViewState;

/// One stored session plus the bookkeeping needed to expire it.
pub struct SessionEntry {
    pub view: ViewState,
    touched: Instant,
    expires: bool,
}

impl SessionEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.expires
            && !matches!(self.view, ViewState::Submitting { .. })
            && now.saturating_duration_since(self.touched) >= ttl
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    pub gemini: Option<Gemini>,
    pub prompts: Prompts,
    pub limits: Limits,
}

impl AppState {
    /// Build state from env: load prompt config and limits, init the Gemini client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let prompts = load_examiner_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();

        let gemini = Gemini::from_env();
        if let Some(g) = &gemini {
            info!(target: "examiner_backend", base_url = %g.base_url, model = %g.model, temperature = g.temperature, "Gemini enabled.");
        } else {
            warn!(target: "examiner_backend", "Gemini disabled (no GEMINI_API_KEY / API_KEY). Every submission will fail.");
        }

        let limits = limits_from_env();
        info!(target: "examiner_backend", ?limits, "Limits configured.");

        Self::with_parts(prompts, gemini).with_limits(limits)
    }

    pub fn with_parts(prompts: Prompts, gemini: Option<Gemini>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            gemini,
            prompts,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Register a fresh idle session that expires when left alone, and return its id.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_session(&self) -> Result<String, ApiError> {
        self.insert_session(true).await
    }

    /// Register a session owned by a WebSocket connection. The caller removes it on disconnect.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_connection_session(&self) -> Result<String, ApiError> {
        self.insert_session(false).await
    }

    async fn insert_session(&self, expires: bool) -> Result<String, ApiError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.limits.max_sessions {
            let ttl = self.limits.session_ttl;
            sessions.retain(|_, e| !e.is_expired(now, ttl));
            if sessions.len() >= self.limits.max_sessions {
                warn!(target: "grading", live = sessions.len(), "Session limit reached");
                return Err(ApiError::TooManySessions);
            }
        }

        let id = Uuid::new_v4().to_string();
        sessions.insert(id.clone(), SessionEntry { view: ViewState::default(), touched: now, expires });
        info!(target: "grading", session_id = %id, expires, "Session created");
        Ok(id)
    }

    /// Drop a session. Returns whether it existed.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_session(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Snapshot of a session. Reading counts as activity.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_session(&self, id: &str) -> Option<SessionOut> {
        self.with_session(id, |v| to_out(id, v)).await
    }

    /// Run one transition on a session under the write lock.
    pub async fn with_session<T>(&self, id: &str, f: impl FnOnce(&mut ViewState) -> T) -> Option<T> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(id).map(|e| {
            e.touched = Instant::now();
            f(&mut e.view)
        })
    }

    /// Remove expiring sessions untouched for the TTL as of `now`. A session with a request in
    /// flight is kept until the request settles.
    pub async fn sweep_expired(&self, now: Instant) -> usize {
        let ttl = self.limits.session_ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, e| !e.is_expired(now, ttl));
        before - sessions.len()
    }
}

/// Periodically drop expired sessions for the lifetime of the process.
pub fn spawn_session_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    let every = (state.limits.session_ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let removed = state.sweep_expired(Instant::now()).await;
            if removed > 0 {
                info!(target: "grading", removed, "Expired sessions dropped");
            } else {
                debug!(target: "grading", "Session sweep found nothing to drop");
            }
        }
    })
}
