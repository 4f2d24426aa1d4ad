//! RAII guard for the per-chat exclusive processing lock (spec.md §4.6
//! "Termination invariants": "the chat lock is released exactly once per
//! admitted request, on all exit paths, even on panic/error"). Generalized
//! from how `skynet-gateway::http::chat` always removes its
//! `active_operations` entry regardless of the result arm — here the
//! removal is moved into `Drop` so an early `return`, a `?`, or an
//! in-flight panic all still release it.

use std::sync::Arc;

use gryag_admission::RateLimiter;
use gryag_core::types::ChatId;
use tracing::warn;

pub struct ChatLockGuard {
    limiter: Arc<RateLimiterHandle>,
    chat_id: ChatId,
    released: bool,
}

/// Thin wrapper so the guard can hold an `Arc` to something that owns the
/// actual `RateLimiter` without requiring `RateLimiter: Clone`.
pub struct RateLimiterHandle(pub RateLimiter);

impl ChatLockGuard {
    pub fn new(limiter: Arc<RateLimiterHandle>, chat_id: ChatId) -> Self {
        Self {
            limiter,
            chat_id,
            released: false,
        }
    }

    /// Releases the lock now rather than waiting for drop, so the handler
    /// can observe any error instead of swallowing it silently.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.limiter.0.release(self.chat_id).await {
            warn!(chat_id = self.chat_id, error = %e, "failed to release chat lock");
        }
    }
}

impl Drop for ChatLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Best-effort fire-and-forget release on the unwind path (panic or
        // early drop without an explicit `.release().await`): spawn onto
        // the current runtime since `Drop` cannot be async.
        let limiter = Arc::clone(&self.limiter);
        let chat_id = self.chat_id;
        tokio::spawn(async move {
            if let Err(e) = limiter.0.release(chat_id).await {
                warn!(chat_id, error = %e, "failed to release chat lock during unwind");
            }
        });
    }
}
