//! Admin endpoints (spec.md §6): `/api/v1/admin/stats` and
//! `/api/v1/admin/reload_persona`. Small surface, guarded by a plain
//! membership check against `AppState::admins` rather than the header-based
//! bearer auth the teacher's terminal `/chat` endpoint uses — the spec's
//! admin surface authenticates by Telegram user id, supplied in the body,
//! since the caller is the frontend process, not an end user's browser.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use gryag_admission::RateLimiterStats;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct AdminRequest {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_secs: i64,
    pub memory_kb: Option<u64>,
    pub in_flight_requests: usize,
    pub admission: RateLimiterStats,
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminRequest>,
) -> Result<Json<StatsResponse>, StatusCode> {
    if !state.is_admin(req.user_id) {
        return Err(StatusCode::FORBIDDEN);
    }
    let uptime_secs = state.clock.now_unix() - state.started_at;
    let admission = state.limiter.0.stats().await.unwrap_or_else(|e| {
        warn!(error = %e, "failed to read admission stats, reporting zeros");
        RateLimiterStats::default()
    });
    Ok(Json(StatsResponse {
        uptime_secs,
        memory_kb: read_rss_kb(),
        in_flight_requests: state.in_flight_count(),
        admission,
    }))
}

pub async fn reload_persona_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminRequest>,
) -> StatusCode {
    if !state.is_admin(req.user_id) {
        return StatusCode::FORBIDDEN;
    }
    let path = format!("{}/persona.txt", state.config.locale.dir);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => {
            state.reload_persona(text).await;
            info!(user_id = req.user_id, "persona reloaded");
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!(path, error = %e, "persona reload failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Parses `VmRSS` out of `/proc/self/status`. Returns `None` off Linux or
/// if the file can't be read — this is an observability nicety, never
/// load-bearing.
fn read_rss_kb() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest.trim().trim_end_matches(" kB").trim().parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_rss_kb_does_not_panic() {
        let _ = read_rss_kb();
    }
}
