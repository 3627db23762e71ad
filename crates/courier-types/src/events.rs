use serde::{Deserialize, Serialize};

use crate::models::{Message, User};

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Authenticate the connection with a bearer token
    Authenticate { token: String },

    /// Send a private message to another user
    PrivateMessage {
        receiver_id: i64,
        content: String,
        #[serde(default = "default_message_type")]
        message_type: String,
    },

    /// Indicate typing toward a specific user
    TypingStart { receiver_id: i64 },

    /// Indicate typing stopped
    TypingStop { receiver_id: i64 },

    /// Mark all messages from `sender_id` to the caller as read
    MarkRead { sender_id: i64 },
}

fn default_message_type() -> String {
    "text".to_string()
}

/// Events sent FROM server TO client over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Authentication succeeded; the connection is now bound
    Authenticated { user: User },

    /// Authentication failed; the connection stays open and unbound
    AuthError { message: String },

    /// Ack to the sender, carrying the persisted message
    MessageSent { message: Message },

    /// Delivery to the receiver
    NewMessage { message: Message },

    /// The named user started typing toward this connection's user
    UserTyping { user_id: i64, username: String },

    /// The named user stopped typing
    UserStoppedTyping { user_id: i64 },

    /// The reader marked this connection's messages as read
    MessagesRead { reader_id: i64, reader_username: String },

    /// A user came online
    UserOnline { user_id: i64, username: String },

    /// A user went offline
    UserOffline { user_id: i64, username: String },

    /// Operation failure reported to the offending connection only
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_names_are_snake_case() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"private_message","data":{"receiver_id":2,"content":"hi"}}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::PrivateMessage {
                receiver_id,
                content,
                message_type,
            } => {
                assert_eq!(receiver_id, 2);
                assert_eq!(content, "hi");
                assert_eq!(message_type, "text"); // defaulted
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn event_envelope_matches_vocabulary() {
        let event = ServerEvent::UserOnline {
            user_id: 7,
            username: "ada".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_online");
        assert_eq!(json["data"]["user_id"], 7);
    }
}
