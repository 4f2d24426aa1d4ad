//! Redis-backed named mutex preventing two replicas from running the same
//! background job concurrently (spec.md §4.7).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;

pub struct JobLock {
    conn: ConnectionManager,
}

impl JobLock {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    /// `SET key 1 NX EX <ttl>` — true if this caller now holds the lock.
    pub async fn try_acquire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    pub async fn release(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
