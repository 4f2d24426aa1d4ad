use rusqlite::{Connection, Result};

/// Initialise all persistence tables. Safe to call on every startup
/// (idempotent) and on every pooled connection the first time it is used.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_messages_table(conn)?;
    create_user_facts_table(conn)?;
    create_chat_summaries_table(conn)?;
    create_media_cache_table(conn)?;
    create_job_cursors_table(conn)?;
    Ok(())
}

/// Messages table, indexed per spec.md §4.2's required index list:
/// `(chat_id, external_message_id)`, `(chat_id, external_user_id)`,
/// `(chat_id, reply_to_external_message_id)`, `(chat_id, created_at desc)`.
fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id                              INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id                         INTEGER NOT NULL,
            thread_id                       INTEGER,
            external_message_id             INTEGER,
            external_user_id                INTEGER,
            role                            TEXT NOT NULL,
            text                            TEXT,
            media_kind                      TEXT,
            media_mime                      TEXT,
            media_file_ref                  TEXT,
            media_width                     INTEGER,
            media_height                    INTEGER,
            media_duration_secs             INTEGER,
            media_caption                   TEXT,
            reply_to_external_message_id    INTEGER,
            reply_to_external_user_id       INTEGER,
            created_at                      INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_chat_external
            ON messages(chat_id, external_message_id)
            WHERE external_message_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_messages_chat_user
            ON messages(chat_id, external_user_id);
        CREATE INDEX IF NOT EXISTS idx_messages_chat_reply_to
            ON messages(chat_id, reply_to_external_message_id);
        CREATE INDEX IF NOT EXISTS idx_messages_chat_created
            ON messages(chat_id, created_at DESC);",
    )
}

/// User facts, deduped by `(chat_id, user_id, fingerprint)` per spec.md §3.
fn create_user_facts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_facts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id     INTEGER NOT NULL,
            user_id     INTEGER NOT NULL,
            text        TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            UNIQUE(chat_id, user_id, fingerprint)
        );
        CREATE INDEX IF NOT EXISTS idx_user_facts_chat_user
            ON user_facts(chat_id, user_id);",
    )
}

/// Chat summaries, at most one row per `(chat_id, window_kind)`.
fn create_chat_summaries_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_summaries (
            chat_id      INTEGER NOT NULL,
            window_kind  TEXT NOT NULL,
            text         TEXT NOT NULL,
            refreshed_at INTEGER NOT NULL,
            PRIMARY KEY (chat_id, window_kind)
        );",
    )
}

/// Content-addressed media cache entries, TTL-swept by a background job.
fn create_media_cache_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS media_cache (
            media_id           TEXT PRIMARY KEY,
            mime               TEXT NOT NULL,
            external_source_ref TEXT,
            local_ref          TEXT,
            width              INTEGER,
            height             INTEGER,
            duration_secs      INTEGER,
            created_at         INTEGER NOT NULL,
            ttl_secs           INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_media_cache_created
            ON media_cache(created_at);",
    )
}

/// Per-(job, chat) watermark so background jobs (spec.md §4.7) can resume
/// where they left off without rescanning the whole message log each tick.
fn create_job_cursors_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS job_cursors (
            job_name   TEXT NOT NULL,
            chat_id    INTEGER NOT NULL,
            cursor_at  INTEGER NOT NULL,
            PRIMARY KEY (job_name, chat_id)
        );",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }
}
