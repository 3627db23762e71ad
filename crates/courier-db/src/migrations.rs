use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            avatar      TEXT,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id     INTEGER NOT NULL REFERENCES users(id),
            receiver_id   INTEGER NOT NULL REFERENCES users(id),
            content       TEXT NOT NULL,
            message_type  TEXT NOT NULL DEFAULT 'text',
            is_read       INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(receiver_id, is_read);

        -- One presence row per user; the PRIMARY KEY makes the
        -- online/offline upsert a single atomic statement.
        CREATE TABLE IF NOT EXISTS session_presence (
            user_id         INTEGER PRIMARY KEY REFERENCES users(id),
            connection_ref  TEXT,
            is_online       INTEGER NOT NULL DEFAULT 0,
            last_seen       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
