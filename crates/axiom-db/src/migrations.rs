use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Creates the schema if absent. Versions are applied in order and
/// recorded in `schema_version`, so reopening an existing file is a no-op.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, threads, messages)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash   TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE threads (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                is_public   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_threads_user ON threads(user_id, created_at);

            CREATE TABLE messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id   INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                message     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_messages_thread ON messages(thread_id, created_at, id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (fact_checks)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE fact_checks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                claim_text  TEXT NOT NULL,
                verdict     TEXT,
                user_id     INTEGER REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_fact_checks_user ON fact_checks(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (2);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
