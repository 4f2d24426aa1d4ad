use gryag_core::types::{ChatId, Clock, UserId};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use crate::stats::RateLimiterStats;

/// Outcome of an admission check (spec.md §4.1 contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allow,
    ThrottleChat,
    ThrottleUser,
    BusyChat,
    /// Reserved for a future in-flight-request dedup check; the three-tier
    /// algorithm in spec.md §4.1 never produces this today.
    DuplicateInflight,
}

/// Per-chat/per-user sliding-window admission limiter plus an exclusive
/// chat lock, backed by Redis atomic primitives only — no read-modify-write
/// outside the store (spec.md §4.1).
pub struct RateLimiter {
    conn: ConnectionManager,
    chat_per_minute: u32,
    user_per_minute: u32,
    lock_ttl_secs: u64,
}

const WINDOW_SECS: u64 = 60;
/// TTL on window counters is window + 5s to cover clock drift.
const WINDOW_TTL_SECS: u64 = WINDOW_SECS + 5;

impl RateLimiter {
    pub async fn connect(
        redis_url: &str,
        chat_per_minute: u32,
        user_per_minute: u32,
        lock_ttl_secs: u64,
    ) -> crate::error::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            chat_per_minute,
            user_per_minute,
            lock_ttl_secs,
        })
    }

    /// Three-tier admission check, evaluated in order: per-chat window,
    /// per-user window, exclusive chat lock. Tiers 1 and 2 fail open on a
    /// store error (admit, with a warning); tier 3 fails closed.
    pub async fn admit(&self, chat_id: ChatId, user_id: UserId, clock: &dyn Clock) -> Outcome {
        let window = clock.now_unix() as u64 / WINDOW_SECS;

        let chat_key = format!("q:chat_minute:{chat_id}:{window}");
        match self.incr_with_expire(&chat_key, WINDOW_TTL_SECS).await {
            Ok(count) if count > self.chat_per_minute as i64 => return Outcome::ThrottleChat,
            Ok(_) => {}
            Err(e) => warn!(chat_id, error = %e, "admission store error on chat tier, failing open"),
        }

        let user_key = format!("q:user_minute:{user_id}:{window}");
        match self.incr_with_expire(&user_key, WINDOW_TTL_SECS).await {
            Ok(count) if count > self.user_per_minute as i64 => return Outcome::ThrottleUser,
            Ok(_) => {}
            Err(e) => warn!(user_id, error = %e, "admission store error on user tier, failing open"),
        }

        let lock_key = format!("lock:chat:{chat_id}");
        match self.try_acquire_lock(&lock_key).await {
            Ok(true) => Outcome::Allow,
            Ok(false) => Outcome::BusyChat,
            Err(e) => {
                warn!(chat_id, error = %e, "admission store error on lock tier, failing closed");
                Outcome::BusyChat
            }
        }
    }

    /// Acquires the exclusive chat lock directly, skipping the per-chat and
    /// per-user window tiers. Used by callers that are not real inbound
    /// messages — proactive nudges must yield to a busy chat rather than
    /// compete with real users for rate-limit budget (spec.md §9).
    pub async fn try_lock_chat(&self, chat_id: ChatId) -> crate::error::Result<bool> {
        let lock_key = format!("lock:chat:{chat_id}");
        self.try_acquire_lock(&lock_key).await
    }

    /// Releases the exclusive chat lock. The caller must guarantee this
    /// runs on every exit path of an admitted request.
    pub async fn release(&self, chat_id: ChatId) -> crate::error::Result<()> {
        let mut conn = self.conn.clone();
        let lock_key = format!("lock:chat:{chat_id}");
        let _: () = conn.del(&lock_key).await?;
        Ok(())
    }

    /// Read-only snapshot of live admission state for `/api/v1/admin/stats`
    /// (spec.md §4.1 supplemental). Uses `SCAN` rather than `KEYS` so a
    /// large key space never blocks the shared Redis connection.
    pub async fn stats(&self) -> crate::error::Result<RateLimiterStats> {
        let mut conn = self.conn.clone();
        Ok(RateLimiterStats {
            chat_buckets_active: count_matching(&mut conn, "q:chat_minute:*").await?,
            user_buckets_active: count_matching(&mut conn, "q:user_minute:*").await?,
            locks_held: count_matching(&mut conn, "lock:chat:*").await?,
        })
    }

    /// `INCR` then `EXPIRE` in one round trip via a pipeline, so the counter
    /// is never left without a TTL between the two commands.
    async fn incr_with_expire(&self, key: &str, ttl_secs: u64) -> crate::error::Result<i64> {
        let mut conn = self.conn.clone();
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    /// `SET key 1 NX PX <ttl>` — set-if-absent with a millisecond TTL.
    async fn try_acquire_lock(&self, key: &str) -> crate::error::Result<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(self.lock_ttl_secs * 1000)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }
}

async fn count_matching(conn: &mut ConnectionManager, pattern: &str) -> crate::error::Result<u64> {
    let mut cursor = 0u64;
    let mut count = 0u64;
    loop {
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(200)
            .query_async(conn)
            .await?;
        count += keys.len() as u64;
        if next_cursor == 0 {
            break;
        }
        cursor = next_cursor;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_inflight_is_distinct_from_busy_chat() {
        assert_ne!(Outcome::DuplicateInflight, Outcome::BusyChat);
    }
}
