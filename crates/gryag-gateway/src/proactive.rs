//! Proactive messaging (spec.md §9 Open Question): on a configurable
//! interval, nudges chats that have gone idle by replaying the same
//! admitted-request path a real inbound message takes, with a synthesized
//! system-triggered request standing in for Telegram's.
//!
//! This lives in `gryag-gateway` rather than alongside the other three
//! background jobs in `gryag-jobs`, because it must call back into this
//! crate's own `http::process::process_admitted` — `gryag-jobs` cannot
//! depend on `gryag-gateway` without a cycle. It still follows the same
//! named-mutex-guarded tick shape `gryag_jobs::engine::run_loop` uses.

use std::sync::Arc;
use std::time::Duration;

use gryag_core::types::ChatId;
use gryag_jobs::JobLock;
use tokio::sync::watch;
use tracing::{info, warn};

use tokio_util::sync::CancellationToken;

use crate::app::AppState;
use crate::http::types::{ChatDto, ChatKind, MessageDto, ProcessRequest, UserDto};
use crate::lock_guard::ChatLockGuard;
use crate::trigger::Triggers;

const JOB_NAME: &str = "proactive";
const LOCK_TTL_SECS: u64 = 300;

pub async fn run(state: Arc<AppState>, job_lock: Arc<JobLock>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.config.proactive.check_interval_secs);
    let mut interval = tokio::time::interval(period);
    info!(job = JOB_NAME, "job loop started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = tick(&state, &job_lock).await {
                    warn!(job = JOB_NAME, error = %e, "job tick failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(job = JOB_NAME, "job loop shutting down");
                    break;
                }
            }
        }
    }
}

async fn tick(state: &Arc<AppState>, job_lock: &JobLock) -> anyhow::Result<()> {
    let lock_key = format!("job:{JOB_NAME}");
    if !job_lock.try_acquire(&lock_key, LOCK_TTL_SECS).await? {
        return Ok(());
    }
    let now = state.clock.now_unix();
    let chats = state.repository.chats_idle_since(state.config.proactive.idle_secs, now)?;
    for chat_id in chats {
        if let Err(e) = nudge_chat(state, chat_id, now).await {
            warn!(chat_id, error = %e, "proactive nudge failed");
        }
    }
    job_lock.release(&lock_key).await?;
    Ok(())
}

/// Yields rather than preempts (spec.md §9): a chat a real message is
/// already being processed for is simply skipped this tick, not queued.
async fn nudge_chat(state: &Arc<AppState>, chat_id: ChatId, now: i64) -> anyhow::Result<()> {
    if !state.limiter.0.try_lock_chat(chat_id).await? {
        return Ok(());
    }
    let guard = ChatLockGuard::new(Arc::clone(&state.limiter), chat_id);

    let req = ProcessRequest {
        chat: ChatDto { id: chat_id, kind: ChatKind::Private, title: None, thread_id: None },
        user: UserDto { id: 0, username: None, first_name: None, is_admin: false, is_bot: false },
        message: MessageDto { id: 0, date: now, text: None, media: Vec::new(), reply_to: None },
        triggers: Triggers { system: true, ..Default::default() },
    };
    let cancel = CancellationToken::new();
    let response = crate::http::process::process_admitted(state, &req, 0, now, JOB_NAME, &cancel).await;
    guard.release().await;

    state.repository.set_job_cursor(JOB_NAME, chat_id, now)?;
    if response.reply.as_deref().is_some_and(|r| !r.trim().is_empty()) {
        info!(chat_id, "proactive nudge produced a reply");
    }
    Ok(())
}
