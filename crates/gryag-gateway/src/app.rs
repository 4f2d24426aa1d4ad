//! Central shared state — passed as `Arc<AppState>` to every axum handler.
//! Generalizes `skynet-gateway::app::AppState`'s struct-of-subsystems shape;
//! the teacher's WS/terminal/channel fields have no counterpart in a
//! single-endpoint inference backend, the notify-suppression map and
//! persona pointer do (spec.md §5, §9).

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    routing::{get, post},
    Router,
};
use gryag_admission::QuotaTracker;
use gryag_agent::context::ContextBuilder;
use gryag_agent::AgentRuntime;
use gryag_core::types::{Clock, SystemClock};
use gryag_core::Config;
use gryag_jobs::JobLock;
use gryag_persistence::Repository;
use tokio::sync::RwLock;

use crate::lock_guard::RateLimiterHandle;
use crate::notify::NotifySuppression;

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub repository: Arc<Repository>,
    pub limiter: Arc<RateLimiterHandle>,
    pub quotas: QuotaTracker,
    pub agent: Arc<AgentRuntime>,
    pub context_builder: ContextBuilder,
    pub notify_suppression: NotifySuppression,
    /// Persona/system-preamble text, hot-reloadable via the admin endpoint
    /// (spec.md §5: "persona file may be hot-reloaded ... copy-on-write
    /// pointer swap").
    pub persona: RwLock<Arc<String>>,
    pub admins: Vec<i64>,
    pub job_lock: Arc<JobLock>,
    /// Count of requests currently past admission, for the stats endpoint.
    pub in_flight: AtomicUsize,
    pub started_at: i64,
}

impl AppState {
    pub fn new(
        config: Config,
        repository: Arc<Repository>,
        limiter: Arc<RateLimiterHandle>,
        quotas: QuotaTracker,
        agent: Arc<AgentRuntime>,
        job_lock: Arc<JobLock>,
        admins: Vec<i64>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let context_builder = ContextBuilder::new(
            Arc::clone(&repository),
            &config.locale.timezone,
            config.agent.context_turns,
            config.agent.multi_media_k,
            config.agent.instruction_char_budget,
        );
        let started_at = clock.now_unix();
        Self {
            config,
            clock,
            repository,
            limiter,
            quotas,
            agent,
            context_builder,
            notify_suppression: NotifySuppression::new(),
            persona: RwLock::new(Arc::new(String::new())),
            admins,
            job_lock,
            in_flight: AtomicUsize::new(0),
            started_at,
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn begin_request(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn end_request(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub async fn persona_text(&self) -> Arc<String> {
        Arc::clone(&*self.persona.read().await)
    }

    /// Swaps the persona text, returning the previous value. Used by
    /// `POST /api/v1/admin/reload_persona` (spec.md §4.8 / §9's
    /// "copy-on-write pointer swap").
    pub async fn reload_persona(&self, text: String) -> Arc<String> {
        let mut guard = self.persona.write().await;
        std::mem::replace(&mut *guard, Arc::new(text))
    }
}

/// Assembles the full axum router (spec.md §6's three endpoints plus
/// liveness).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/v1/process", post(crate::http::process::process_handler))
        .route("/api/v1/admin/stats", post(crate::http::admin::stats_handler))
        .route(
            "/api/v1/admin/reload_persona",
            post(crate::http::admin::reload_persona_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
