use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, User};

// -- JWT Claims --

/// JWT claims shared between courier-api (REST middleware) and
/// courier-gateway (WebSocket auth gate). The token carries only the
/// user id; display attributes are resolved from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
}

// -- Conversations --

/// One peer with shared history: the latest message plus the caller's
/// unread count for that peer. Derived on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub peer_id: i64,
    pub peer_username: String,
    pub peer_avatar: Option<String>,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub last_message_read: bool,
    pub unread_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

// -- Chat history --

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<Message>,
    pub other_user: User,
}

// -- Unread counts --

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountsResponse {
    /// sender_id -> number of unread messages from that sender
    pub unread_counts: HashMap<i64, i64>,
}
