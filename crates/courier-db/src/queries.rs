use crate::Database;
use crate::models::{ConversationRow, MessageRow, PresenceRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Registration lives outside this system; this exists for seeding
    /// and tests.
    pub fn create_user(&self, username: &str, avatar: Option<&str>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, avatar) VALUES (?1, ?2)",
                rusqlite::params![username, avatar],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username, avatar, created_at FROM users WHERE id = ?1")?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        avatar: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    // -- Messages --

    /// Insert a message and read the persisted row back. The id and
    /// created_at are assigned here, never by the client.
    pub fn insert_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
        message_type: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content, message_type)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![sender_id, receiver_id, content, message_type],
            )?;
            let id = conn.last_insert_rowid();
            query_message_by_id(conn, id)
        })
    }

    /// Batch-transition messages from `sender_id` to `receiver_id` to
    /// read. Idempotent; returns the number of rows flipped.
    pub fn mark_messages_read(&self, sender_id: i64, receiver_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                rusqlite::params![sender_id, receiver_id],
            )?;
            Ok(changed)
        })
    }

    /// Messages between two users, ascending by time. `before` is a
    /// cursor (created_at of the oldest message from the previous page).
    pub fn get_chat_history(
        &self,
        user_id: i64,
        peer_id: i64,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            // Fetch the newest page descending, then flip to ascending.
            let sql = format!(
                "SELECT m.id, m.sender_id, m.receiver_id, u.username,
                        m.content, m.message_type, m.is_read, m.created_at
                 FROM messages m
                 JOIN users u ON u.id = m.sender_id
                 WHERE ((m.sender_id = ?1 AND m.receiver_id = ?2)
                     OR (m.sender_id = ?2 AND m.receiver_id = ?1))
                 {}
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?3",
                if before.is_some() {
                    "AND m.created_at < ?4"
                } else {
                    ""
                }
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = match before {
                Some(cursor) => stmt
                    .query_map(
                        rusqlite::params![user_id, peer_id, limit, cursor],
                        map_message_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map(rusqlite::params![user_id, peer_id, limit], map_message_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            };
            rows.reverse();
            Ok(rows)
        })
    }

    // -- Conversations --

    /// One row per peer with shared history: the latest message
    /// (created_at desc, id desc tie-break) and the caller's unread
    /// count. Peers with zero shared messages never appear.
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.avatar,
                        lm.content, lm.created_at, lm.is_read,
                        (SELECT COUNT(*) FROM messages c
                          WHERE c.sender_id = u.id AND c.receiver_id = ?1 AND c.is_read = 0)
                 FROM users u
                 JOIN messages lm ON lm.id = (
                     SELECT m.id FROM messages m
                      WHERE (m.sender_id = ?1 AND m.receiver_id = u.id)
                         OR (m.sender_id = u.id AND m.receiver_id = ?1)
                      ORDER BY m.created_at DESC, m.id DESC
                      LIMIT 1
                 )
                 WHERE u.id != ?1
                 ORDER BY lm.created_at DESC, lm.id DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        peer_id: row.get(0)?,
                        peer_username: row.get(1)?,
                        peer_avatar: row.get(2)?,
                        last_message: row.get(3)?,
                        last_message_at: row.get(4)?,
                        last_message_read: row.get(5)?,
                        unread_count: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Unread totals grouped by sender for one receiver.
    pub fn unread_counts_by_sender(&self, receiver_id: i64) -> Result<Vec<(i64, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND is_read = 0
                 GROUP BY sender_id",
            )?;
            let rows = stmt
                .query_map([receiver_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Presence --

    /// Atomic upsert: mark the user online on this connection.
    pub fn upsert_presence_online(&self, user_id: i64, connection_ref: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_presence (user_id, connection_ref, is_online, last_seen)
                 VALUES (?1, ?2, 1, strftime('%Y-%m-%d %H:%M:%f','now'))
                 ON CONFLICT(user_id) DO UPDATE SET
                     connection_ref = excluded.connection_ref,
                     is_online = 1,
                     last_seen = excluded.last_seen",
                rusqlite::params![user_id, connection_ref],
            )?;
            Ok(())
        })
    }

    pub fn mark_presence_offline(&self, user_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE session_presence
                 SET is_online = 0, last_seen = strftime('%Y-%m-%d %H:%M:%f','now')
                 WHERE user_id = ?1",
                [user_id],
            )?;
            Ok(())
        })
    }

    pub fn get_presence(&self, user_id: i64) -> Result<Option<PresenceRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, connection_ref, is_online, last_seen
                 FROM session_presence WHERE user_id = ?1",
            )?;
            let row = stmt
                .query_row([user_id], |row| {
                    Ok(PresenceRow {
                        user_id: row.get(0)?,
                        connection_ref: row.get(1)?,
                        is_online: row.get(2)?,
                        last_seen: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }
}

fn query_message_by_id(conn: &Connection, id: i64) -> Result<MessageRow> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.sender_id, m.receiver_id, u.username,
                m.content, m.message_type, m.is_read, m.created_at
         FROM messages m
         JOIN users u ON u.id = m.sender_id
         WHERE m.id = ?1",
    )?;
    let row = stmt.query_row([id], map_message_row)?;
    Ok(row)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        sender_username: row.get(3)?,
        content: row.get(4)?,
        message_type: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
