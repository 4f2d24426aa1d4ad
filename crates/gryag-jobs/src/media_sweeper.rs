//! Periodic removal of TTL-expired `media_cache` rows (spec.md §4.7).

use std::sync::Arc;
use std::time::Duration;

use gryag_core::types::Clock;
use gryag_persistence::Repository;
use tokio::sync::watch;
use tracing::info;

use crate::engine::run_loop;
use crate::error::Result;
use crate::lock::JobLock;

const JOB_NAME: &str = "media_sweeper";
const LOCK_TTL_SECS: u64 = 60;

pub async fn run(
    period: Duration,
    repository: Arc<Repository>,
    lock: Arc<JobLock>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) {
    run_loop(JOB_NAME, period, shutdown, move || {
        let repository = repository.clone();
        let lock = lock.clone();
        let clock = clock.clone();
        async move { run_once(&repository, &lock, clock.as_ref()).await }
    })
    .await;
}

pub async fn run_once(repository: &Repository, lock: &JobLock, clock: &dyn Clock) -> Result<()> {
    let lock_key = format!("job:{JOB_NAME}");
    if !lock.try_acquire(&lock_key, LOCK_TTL_SECS).await? {
        return Ok(());
    }
    let removed = repository.sweep_expired_media(clock.now_unix())?;
    if removed > 0 {
        info!(removed, "swept expired media cache entries");
    }
    lock.release(&lock_key).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gryag_core::types::FixedClock;
    use gryag_persistence::types::MediaCacheEntry;

    fn entry(media_id: &str, created_at: i64, ttl_secs: i64) -> MediaCacheEntry {
        MediaCacheEntry {
            media_id: media_id.to_string(),
            mime: "image/png".to_string(),
            external_source_ref: None,
            local_ref: Some("/tmp/x.png".to_string()),
            width: None,
            height: None,
            duration_secs: None,
            created_at,
            ttl_secs,
        }
    }

    #[test]
    fn sweep_expired_media_removes_only_past_ttl_entries() {
        let repo = Repository::new_in_memory().unwrap();
        repo.put_media(&entry("fresh", 1_000, 3_600)).unwrap();
        repo.put_media(&entry("stale", 1_000, 10)).unwrap();
        let clock = FixedClock::new(2_000);
        let removed = repo.sweep_expired_media(clock.now_unix()).unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get_media("stale").unwrap().is_none());
        assert!(repo.get_media("fresh").unwrap().is_some());
    }
}
