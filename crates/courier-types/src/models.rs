use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resolved user reference. The relay never mutates users; display
/// attributes are cached on the connection at bind time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
}

/// A persisted private message. Immutable except `is_read`, which only
/// ever transitions false -> true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub sender_username: String,
    pub content: String,
    pub message_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Last known presence for a user. At most one row per user;
/// last-writer-wins on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPresence {
    pub user_id: i64,
    pub connection_ref: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}
