//! Database row types — these map directly to SQLite rows.
//! Distinct from courier-types wire models to keep the DB layer
//! independent; conversions live here so the timestamp parsing is
//! done once.

use chrono::{DateTime, Utc};
use tracing::warn;

use courier_types::api::ConversationSummary;
use courier_types::models::{Message, SessionPresence, User};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub sender_username: String,
    pub content: String,
    pub message_type: String,
    pub is_read: bool,
    pub created_at: String,
}

pub struct PresenceRow {
    pub user_id: i64,
    pub connection_ref: Option<String>,
    pub is_online: bool,
    pub last_seen: String,
}

pub struct ConversationRow {
    pub peer_id: i64,
    pub peer_username: String,
    pub peer_avatar: Option<String>,
    pub last_message: String,
    pub last_message_at: String,
    pub last_message_read: bool,
    pub unread_count: i64,
}

/// SQLite stores timestamps as text. The default is
/// "YYYY-MM-DD HH:MM:SS.SSS" (no timezone, implicitly UTC); tolerate
/// plain RFC 3339 and second-precision values too.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            avatar: self.avatar,
        }
    }
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            sender_username: self.sender_username,
            content: self.content,
            message_type: self.message_type,
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

impl PresenceRow {
    pub fn into_presence(self) -> SessionPresence {
        SessionPresence {
            user_id: self.user_id,
            connection_ref: self.connection_ref,
            is_online: self.is_online,
            last_seen: parse_timestamp(&self.last_seen),
        }
    }
}

impl ConversationRow {
    pub fn into_summary(self) -> ConversationSummary {
        ConversationSummary {
            peer_id: self.peer_id,
            peer_username: self.peer_username,
            peer_avatar: self.peer_avatar,
            last_message: self.last_message,
            last_message_at: parse_timestamp(&self.last_message_at),
            last_message_read: self.last_message_read,
            unread_count: self.unread_count,
        }
    }
}
