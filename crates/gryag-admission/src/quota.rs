use gryag_core::types::{Clock, UserId};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Per-tool quota policy (spec.md §3 `QuotaBucket` dimensions): an hourly
/// sliding window (`feature_hour`), a daily one (`feature_day`/`image_day`/
/// `sandbox_day`), or both — `remember_memory` is the one tool that checks
/// both — plus an optional post-call cooldown. `None` means that dimension
/// isn't enforced for this tool at all.
#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    pub hour_quota: Option<u32>,
    pub day_quota: Option<u32>,
    pub cooldown_secs: u64,
}

impl QuotaPolicy {
    pub const NONE: QuotaPolicy = QuotaPolicy { hour_quota: None, day_quota: None, cooldown_secs: 0 };
}

/// Outcome of a per-tool quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    Allowed,
    /// An hour or day bucket is exhausted; `retry_after_seconds` is time
    /// until that bucket rolls over.
    Throttled { retry_after_seconds: u64 },
    /// Cooldown since the last successful call has not elapsed yet.
    Cooldown { retry_after_seconds: u64 },
}

const HOUR_SECS: u64 = 3_600;
const DAY_SECS: u64 = 86_400;

/// Tracks per-tool hourly/daily quotas and per-call cooldowns as Redis keys
/// (spec.md §3 `QuotaBucket` dimensions `image_day`, `sandbox_day`,
/// `feature_hour`, `feature_day`; key shapes per spec.md §6:
/// `feat:{name}:{user}:{hour}`, `feat:{name}:{user}:{day}`, `cool:{name}:{user}`).
pub struct QuotaTracker {
    conn: ConnectionManager,
}

impl QuotaTracker {
    pub async fn connect(redis_url: &str) -> crate::error::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    /// Checks and, if allowed, consumes one unit of each quota dimension
    /// `policy` enforces (hour, day, or both — `remember_memory` is the one
    /// tool that checks both) and starts the cooldown.
    pub async fn check_and_consume(
        &self,
        tool: &str,
        user_id: UserId,
        policy: QuotaPolicy,
        clock: &dyn Clock,
    ) -> crate::error::Result<QuotaOutcome> {
        let mut conn = self.conn.clone();
        let now = clock.now_unix() as u64;

        let cooldown_key = format!("cool:{tool}:{user_id}");
        let cooldown_until: Option<u64> = conn.get(&cooldown_key).await?;
        if let Some(until) = cooldown_until {
            if until > now {
                return Ok(QuotaOutcome::Cooldown {
                    retry_after_seconds: until - now,
                });
            }
        }

        if let Some(hour_quota) = policy.hour_quota {
            let hour = now / HOUR_SECS;
            let key = format!("feat:{tool}:{user_id}:{hour}");
            let count = incr_with_expire(&mut conn, &key, HOUR_SECS).await?;
            if count > hour_quota as i64 {
                let next_hour = (hour + 1) * HOUR_SECS;
                return Ok(QuotaOutcome::Throttled {
                    retry_after_seconds: next_hour - now,
                });
            }
        }

        if let Some(day_quota) = policy.day_quota {
            let day = now / DAY_SECS;
            let key = format!("feat:{tool}:{user_id}:{day}");
            let count = incr_with_expire(&mut conn, &key, DAY_SECS).await?;
            if count > day_quota as i64 {
                let next_midnight = (day + 1) * DAY_SECS;
                return Ok(QuotaOutcome::Throttled {
                    retry_after_seconds: next_midnight - now,
                });
            }
        }

        if policy.cooldown_secs > 0 {
            let _: () = conn
                .set_ex(&cooldown_key, now + policy.cooldown_secs, policy.cooldown_secs)
                .await?;
        }

        Ok(QuotaOutcome::Allowed)
    }
}

async fn incr_with_expire(conn: &mut ConnectionManager, key: &str, ttl_secs: u64) -> crate::error::Result<i64> {
    let (count,): (i64,) = redis::pipe()
        .atomic()
        .incr(key, 1)
        .expire(key, ttl_secs as i64)
        .ignore()
        .query_async(conn)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_carry_retry_after_seconds() {
        let throttled = QuotaOutcome::Throttled {
            retry_after_seconds: 3600,
        };
        assert!(matches!(throttled, QuotaOutcome::Throttled { retry_after_seconds: 3600 }));
    }
}
