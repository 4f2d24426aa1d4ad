use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use gryag_core::types::{ChatId, Role, UserId, WindowKind};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;
use tracing::warn;

use crate::db::init_db;
use crate::error::{PersistenceError, Result};
use crate::types::{
    fingerprint_fact, ChatSummary, MediaCacheEntry, MediaDescriptor, Message, NewMessage,
    UpsertOutcome, UserFact,
};

/// Cache entries expire after 5 minutes (spec.md §4.2 supplemental,
/// matching the teacher's own `MemoryManager::build_user_context` cache).
const SUMMARY_CACHE_TTL_SECS: u64 = 300;
/// Maximum cache entries before eviction.
const MAX_SUMMARY_CACHE_ENTRIES: usize = 256;

struct CachedSummary {
    value: Option<ChatSummary>,
    cached_at: Instant,
}

/// Strongly-typed storage surface. All SQL lives here; every other
/// component consumes this repository rather than touching SQLite
/// directly (spec.md §4.2 "the layer is the only place SQL is written").
///
/// Uses a bounded `r2d2` pool rather than a single mutex-guarded connection
/// so concurrent in-flight requests do not serialize on one lock.
pub struct Repository {
    pool: Pool<SqliteConnectionManager>,
    summary_cache: Mutex<HashMap<(ChatId, WindowKind), CachedSummary>>,
}

impl Repository {
    pub fn new(path: &str, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(PersistenceError::Pool)?;
        {
            let conn = pool.get().map_err(PersistenceError::Pool)?;
            init_db(&conn)?;
        }
        Ok(Self { pool, summary_cache: Mutex::new(HashMap::new()) })
    }

    /// In-memory store for tests — available to downstream crates too,
    /// since their own test builds never see this crate's `cfg(test)`.
    pub fn new_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(PersistenceError::Pool)?;
        {
            let conn = pool.get().map_err(PersistenceError::Pool)?;
            init_db(&conn)?;
        }
        Ok(Self { pool, summary_cache: Mutex::new(HashMap::new()) })
    }

    pub fn insert_message(&self, msg: &NewMessage) -> Result<i64> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let (kind, mime, file_ref, width, height, duration, caption) = split_media(&msg.media);
        conn.execute(
            "INSERT INTO messages
             (chat_id, thread_id, external_message_id, external_user_id, role, text,
              media_kind, media_mime, media_file_ref, media_width, media_height,
              media_duration_secs, media_caption,
              reply_to_external_message_id, reply_to_external_user_id, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            rusqlite::params![
                msg.chat_id,
                msg.thread_id,
                msg.external_message_id,
                msg.external_user_id,
                msg.role.to_string(),
                msg.text,
                kind,
                mime,
                file_ref,
                width,
                height,
                duration,
                caption,
                msg.reply_to_external_message_id,
                msg.reply_to_external_user_id,
                msg.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns the last `2 * limit_turns` messages (1 turn = user + assistant),
    /// chronological ascending (spec.md §4.2, §8 invariant 5).
    pub fn recent_messages(
        &self,
        chat_id: ChatId,
        thread_id: Option<i64>,
        limit_turns: u32,
    ) -> Result<Vec<Message>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let limit_messages = (limit_turns as i64) * 2;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, thread_id, external_message_id, external_user_id, role, text,
                    media_kind, media_mime, media_file_ref, media_width, media_height,
                    media_duration_secs, media_caption,
                    reply_to_external_message_id, reply_to_external_user_id, created_at
             FROM messages
             WHERE chat_id = ?1 AND (?2 IS NULL OR thread_id = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3",
        )?;
        let rows: Vec<Message> = stmt
            .query_map(rusqlite::params![chat_id, thread_id, limit_messages], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        let mut out = rows;
        out.reverse();
        Ok(out)
    }

    pub fn message_by_external(
        &self,
        chat_id: ChatId,
        external_message_id: i64,
    ) -> Result<Option<Message>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        conn.query_row(
            "SELECT id, chat_id, thread_id, external_message_id, external_user_id, role, text,
                    media_kind, media_mime, media_file_ref, media_width, media_height,
                    media_duration_secs, media_caption,
                    reply_to_external_message_id, reply_to_external_user_id, created_at
             FROM messages
             WHERE chat_id = ?1 AND external_message_id = ?2",
            rusqlite::params![chat_id, external_message_id],
            row_to_message,
        )
        .optional()
        .map_err(PersistenceError::from)
    }

    /// Walks the reply-to chain up to `depth` hops, stopping early if a
    /// message has no further reply-to pointer.
    pub fn reply_chain(
        &self,
        chat_id: ChatId,
        external_message_id: i64,
        depth: u32,
    ) -> Result<Vec<Message>> {
        let mut chain = Vec::new();
        let mut cursor = Some(external_message_id);
        for _ in 0..depth {
            let Some(id) = cursor else { break };
            let Some(msg) = self.message_by_external(chat_id, id)? else {
                break;
            };
            cursor = msg.reply_to_external_message_id;
            chain.push(msg);
        }
        Ok(chain)
    }

    pub fn delete_message_by_external(
        &self,
        chat_id: ChatId,
        external_message_id: i64,
    ) -> Result<bool> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let n = conn.execute(
            "DELETE FROM messages WHERE chat_id = ?1 AND external_message_id = ?2",
            rusqlite::params![chat_id, external_message_id],
        )?;
        Ok(n > 0)
    }

    /// Deletes messages older than `days`. Never touches user facts or
    /// summaries (spec.md §4.2 "pruning must not touch user facts or
    /// summaries").
    pub fn prune_older_than(&self, days: u32, now_unix: i64) -> Result<u64> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let cutoff = now_unix - (days as i64) * 86_400;
        let n = conn.execute("DELETE FROM messages WHERE created_at < ?1", [cutoff])?;
        Ok(n as u64)
    }

    /// Dedups by MD5 fingerprint of normalized text (spec.md §8 invariant 4).
    pub fn upsert_user_fact(&self, chat_id: ChatId, user_id: UserId, text: &str, now_unix: i64) -> Result<UpsertOutcome> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let fingerprint = fingerprint_fact(text);
        let n = conn.execute(
            "INSERT OR IGNORE INTO user_facts (chat_id, user_id, text, fingerprint, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            rusqlite::params![chat_id, user_id, text, fingerprint, now_unix],
        )?;
        Ok(if n > 0 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Duplicate
        })
    }

    pub fn list_user_facts(&self, chat_id: ChatId, user_id: UserId) -> Result<Vec<UserFact>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, user_id, text, fingerprint, created_at
             FROM user_facts WHERE chat_id = ?1 AND user_id = ?2
             ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![chat_id, user_id], row_to_fact)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn delete_user_fact(&self, id: i64) -> Result<bool> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let n = conn.execute("DELETE FROM user_facts WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    /// Cached for 5 minutes (spec.md §4.2 supplemental) since the context
    /// builder calls this on every request; invalidated immediately by
    /// `upsert_summary` so a freshly refreshed summary is never served stale.
    pub fn get_summary(&self, chat_id: ChatId, window_kind: WindowKind) -> Result<Option<ChatSummary>> {
        let key = (chat_id, window_kind);
        if let Some(cached) = self.summary_cache.lock().unwrap().get(&key) {
            if cached.cached_at.elapsed().as_secs() < SUMMARY_CACHE_TTL_SECS {
                return Ok(cached.value.clone());
            }
        }

        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let value = conn
            .query_row(
                "SELECT chat_id, window_kind, text, refreshed_at
                 FROM chat_summaries WHERE chat_id = ?1 AND window_kind = ?2",
                rusqlite::params![chat_id, window_kind.as_str()],
                row_to_summary,
            )
            .optional()
            .map_err(PersistenceError::from)?;

        let mut cache = self.summary_cache.lock().unwrap();
        if cache.len() >= MAX_SUMMARY_CACHE_ENTRIES && !cache.contains_key(&key) {
            if let Some(oldest) = cache.iter().min_by_key(|(_, v)| v.cached_at).map(|(k, _)| *k) {
                cache.remove(&oldest);
            }
        }
        cache.insert(key, CachedSummary { value: value.clone(), cached_at: Instant::now() });
        Ok(value)
    }

    pub fn upsert_summary(&self, chat_id: ChatId, window_kind: WindowKind, text: &str, now_unix: i64) -> Result<()> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        conn.execute(
            "INSERT INTO chat_summaries (chat_id, window_kind, text, refreshed_at)
             VALUES (?1,?2,?3,?4)
             ON CONFLICT(chat_id, window_kind) DO UPDATE SET text = excluded.text, refreshed_at = excluded.refreshed_at",
            rusqlite::params![chat_id, window_kind.as_str(), text, now_unix],
        )?;
        self.summary_cache.lock().unwrap().remove(&(chat_id, window_kind));
        Ok(())
    }

    pub fn put_media(&self, entry: &MediaCacheEntry) -> Result<String> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        conn.execute(
            "INSERT INTO media_cache (media_id, mime, external_source_ref, local_ref, width, height, duration_secs, created_at, ttl_secs)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            rusqlite::params![
                entry.media_id,
                entry.mime,
                entry.external_source_ref,
                entry.local_ref,
                entry.width,
                entry.height,
                entry.duration_secs,
                entry.created_at,
                entry.ttl_secs,
            ],
        )?;
        Ok(entry.media_id.clone())
    }

    pub fn get_media(&self, media_id: &str) -> Result<Option<MediaCacheEntry>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        conn.query_row(
            "SELECT media_id, mime, external_source_ref, local_ref, width, height, duration_secs, created_at, ttl_secs
             FROM media_cache WHERE media_id = ?1",
            [media_id],
            |row| {
                Ok(MediaCacheEntry {
                    media_id: row.get(0)?,
                    mime: row.get(1)?,
                    external_source_ref: row.get(2)?,
                    local_ref: row.get(3)?,
                    width: row.get(4)?,
                    height: row.get(5)?,
                    duration_secs: row.get(6)?,
                    created_at: row.get(7)?,
                    ttl_secs: row.get(8)?,
                })
            },
        )
        .optional()
        .map_err(PersistenceError::from)
    }

    /// Most recently cached media, newest first — feeds the context
    /// builder's multi-media buffer block (spec.md §4.5 block 7).
    pub fn recent_media(&self, limit: u32) -> Result<Vec<MediaCacheEntry>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let mut stmt = conn.prepare(
            "SELECT media_id, mime, external_source_ref, local_ref, width, height, duration_secs, created_at, ttl_secs
             FROM media_cache ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], |row| {
                Ok(MediaCacheEntry {
                    media_id: row.get(0)?,
                    mime: row.get(1)?,
                    external_source_ref: row.get(2)?,
                    local_ref: row.get(3)?,
                    width: row.get(4)?,
                    height: row.get(5)?,
                    duration_secs: row.get(6)?,
                    created_at: row.get(7)?,
                    ttl_secs: row.get(8)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Sweeps expired media entries. Returns the number removed.
    pub fn sweep_expired_media(&self, now_unix: i64) -> Result<u64> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let n = conn.execute(
            "DELETE FROM media_cache WHERE created_at + ttl_secs < ?1",
            [now_unix],
        )?;
        Ok(n as u64)
    }

    /// Chats whose newest message is more recent than their `window_kind`
    /// summary (or that have no summary at all), feeding the summarizer job
    /// (spec.md §4.7).
    pub fn chats_needing_summary(&self, window_kind: WindowKind, now_unix: i64) -> Result<Vec<ChatId>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let window_floor = now_unix - window_kind.days() as i64 * 86_400;
        let mut stmt = conn.prepare(
            "SELECT m.chat_id
             FROM messages m
             LEFT JOIN chat_summaries s
               ON s.chat_id = m.chat_id AND s.window_kind = ?1
             WHERE m.created_at >= ?2
             GROUP BY m.chat_id
             HAVING MAX(m.created_at) > COALESCE(MAX(s.refreshed_at), 0)",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![window_kind.as_str(), window_floor], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Chats with a bot-addressed user message created after the job's last
    /// processed watermark for `job_name` (spec.md §4.7 memory extractor).
    pub fn chats_with_unprocessed_messages(&self, job_name: &str, since_default: i64) -> Result<Vec<(ChatId, i64)>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let mut stmt = conn.prepare(
            "SELECT m.chat_id, MAX(m.created_at)
             FROM messages m
             LEFT JOIN job_cursors c
               ON c.job_name = ?1 AND c.chat_id = m.chat_id
             WHERE m.role = 'user' AND m.created_at > COALESCE(c.cursor_at, ?2)
             GROUP BY m.chat_id",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![job_name, since_default], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Messages for `chat_id` with `created_at` in `(after, up_to]`, oldest
    /// first — the window a background job analyses in one pass.
    pub fn messages_in_range(&self, chat_id: ChatId, after: i64, up_to: i64) -> Result<Vec<Message>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, thread_id, external_message_id, external_user_id, role, text,
                    media_kind, media_mime, media_file_ref, media_width, media_height,
                    media_duration_secs, media_caption,
                    reply_to_external_message_id, reply_to_external_user_id, created_at
             FROM messages
             WHERE chat_id = ?1 AND created_at > ?2 AND created_at <= ?3
             ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![chat_id, after, up_to], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Chats whose newest message is older than `idle_secs` and that have
    /// not already been nudged since that message (spec.md §9 proactive
    /// messaging: "yields rather than preempts", never re-fires on the same
    /// idle period). `job_cursors` under job name `"proactive"` tracks the
    /// message timestamp last acted on per chat.
    pub fn chats_idle_since(&self, idle_secs: i64, now_unix: i64) -> Result<Vec<ChatId>> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        let cutoff = now_unix - idle_secs;
        let mut stmt = conn.prepare(
            "SELECT m.chat_id
             FROM messages m
             LEFT JOIN job_cursors c
               ON c.job_name = 'proactive' AND c.chat_id = m.chat_id
             GROUP BY m.chat_id
             HAVING MAX(m.created_at) < ?1 AND MAX(m.created_at) > COALESCE(c.cursor_at, 0)",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![cutoff], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Advances (or creates) `job_name`'s watermark for `chat_id`.
    pub fn set_job_cursor(&self, job_name: &str, chat_id: ChatId, cursor_at: i64) -> Result<()> {
        let conn = self.pool.get().map_err(PersistenceError::Pool)?;
        conn.execute(
            "INSERT INTO job_cursors (job_name, chat_id, cursor_at) VALUES (?1,?2,?3)
             ON CONFLICT(job_name, chat_id) DO UPDATE SET cursor_at = excluded.cursor_at",
            rusqlite::params![job_name, chat_id, cursor_at],
        )?;
        Ok(())
    }
}

fn split_media(
    media: &Option<MediaDescriptor>,
) -> (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<u32>,
    Option<u32>,
    Option<u32>,
    Option<String>,
) {
    match media {
        Some(m) => (
            Some(m.kind.to_string()),
            Some(m.mime.clone()),
            Some(m.file_ref.clone()),
            m.width,
            m.height,
            m.duration_secs,
            m.caption.clone(),
        ),
        None => (None, None, None, None, None, None, None),
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(5)?;
    let role: Role = role_str.parse().unwrap_or_else(|e| {
        warn!(role = %role_str, "unrecognized role in storage, defaulting to user: {e}");
        Role::User
    });
    let kind: Option<String> = row.get(7)?;
    let media = kind.map(|k| MediaDescriptor {
        kind: k.parse().unwrap_or(gryag_core::types::MediaKind::Document),
        mime: row.get::<_, Option<String>>(8).unwrap_or_default().unwrap_or_default(),
        file_ref: row.get::<_, Option<String>>(9).unwrap_or_default().unwrap_or_default(),
        width: row.get(10).unwrap_or_default(),
        height: row.get(11).unwrap_or_default(),
        duration_secs: row.get(12).unwrap_or_default(),
        caption: row.get(13).unwrap_or_default(),
    });
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        thread_id: row.get(2)?,
        external_message_id: row.get(3)?,
        external_user_id: row.get(4)?,
        role,
        text: row.get(6)?,
        media,
        reply_to_external_message_id: row.get(14)?,
        reply_to_external_user_id: row.get(15)?,
        created_at: row.get(16)?,
    })
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserFact> {
    Ok(UserFact {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        user_id: row.get(2)?,
        text: row.get(3)?,
        fingerprint: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSummary> {
    let kind_str: String = row.get(1)?;
    Ok(ChatSummary {
        chat_id: row.get(0)?,
        window_kind: kind_str.parse().unwrap_or(WindowKind::SevenDay),
        text: row.get(2)?,
        refreshed_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(chat_id: ChatId, external_id: i64, role: Role, created_at: i64) -> NewMessage {
        NewMessage {
            chat_id,
            thread_id: None,
            external_message_id: Some(external_id),
            external_user_id: Some(7),
            role,
            text: Some("hello".into()),
            media: None,
            reply_to_external_message_id: None,
            reply_to_external_user_id: None,
            created_at,
        }
    }

    #[test]
    fn insert_and_fetch_message_by_external_id() {
        let repo = Repository::new_in_memory().unwrap();
        repo.insert_message(&new_message(-100, 42, Role::User, 1000)).unwrap();
        let found = repo.message_by_external(-100, 42).unwrap().unwrap();
        assert_eq!(found.text.as_deref(), Some("hello"));
        assert!(repo.message_by_external(-100, 99).unwrap().is_none());
    }

    #[test]
    fn recent_messages_returns_up_to_two_times_limit_turns_chronological() {
        let repo = Repository::new_in_memory().unwrap();
        for i in 0..6 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            repo.insert_message(&new_message(-100, i, role, 1000 + i)).unwrap();
        }
        let msgs = repo.recent_messages(-100, None, 2).unwrap();
        assert_eq!(msgs.len(), 4);
        let ids: Vec<_> = msgs.iter().map(|m| m.external_message_id.unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 4, 5]);
    }

    #[test]
    fn upsert_user_fact_dedups_by_fingerprint() {
        let repo = Repository::new_in_memory().unwrap();
        let a = repo.upsert_user_fact(-100, 7, "lives in Kyiv", 1000).unwrap();
        let b = repo.upsert_user_fact(-100, 7, "Lives in Kyiv.", 1001).unwrap();
        let c = repo.upsert_user_fact(-100, 7, "lives in Kyiv", 1002).unwrap();
        assert_eq!(a, UpsertOutcome::Created);
        assert_eq!(b, UpsertOutcome::Duplicate);
        assert_eq!(c, UpsertOutcome::Duplicate);
        assert_eq!(repo.list_user_facts(-100, 7).unwrap().len(), 1);
    }

    #[test]
    fn prune_older_than_removes_only_stale_messages() {
        let repo = Repository::new_in_memory().unwrap();
        repo.insert_message(&new_message(-100, 1, Role::User, 1000)).unwrap();
        repo.insert_message(&new_message(-100, 2, Role::User, 900_000)).unwrap();
        let deleted = repo.prune_older_than(1, 900_100).unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.message_by_external(-100, 1).unwrap().is_none());
        assert!(repo.message_by_external(-100, 2).unwrap().is_some());
    }

    #[test]
    fn upsert_summary_replaces_existing_row_for_same_window() {
        let repo = Repository::new_in_memory().unwrap();
        repo.upsert_summary(-100, WindowKind::SevenDay, "first", 1000).unwrap();
        repo.upsert_summary(-100, WindowKind::SevenDay, "second", 2000).unwrap();
        let summary = repo.get_summary(-100, WindowKind::SevenDay).unwrap().unwrap();
        assert_eq!(summary.text, "second");
    }

    #[test]
    fn reply_chain_follows_pointers_up_to_depth() {
        let repo = Repository::new_in_memory().unwrap();
        repo.insert_message(&new_message(-100, 1, Role::User, 1000)).unwrap();
        let mut second = new_message(-100, 2, Role::User, 1001);
        second.reply_to_external_message_id = Some(1);
        repo.insert_message(&second).unwrap();
        let mut third = new_message(-100, 3, Role::User, 1002);
        third.reply_to_external_message_id = Some(2);
        repo.insert_message(&third).unwrap();

        let chain = repo.reply_chain(-100, 3, 5).unwrap();
        let ids: Vec<_> = chain.iter().map(|m| m.external_message_id.unwrap()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
