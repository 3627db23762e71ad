use thiserror::Error;

use courier_types::events::ServerEvent;
use courier_types::models::Message;

use crate::Gateway;
use crate::registry::ConnId;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("empty message content")]
    EmptyContent,
    #[error("persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

/// Validate, persist, and route one private message.
///
/// Persist first: the id and created_at on the wire are always the
/// server-assigned ones. Delivery to the receiver happens only if they
/// have a live connection — no queuing, no retry; an offline receiver
/// finds the message on their next history fetch. The sender is acked
/// with the persisted message regardless of delivery.
pub async fn send_message(
    gateway: &Gateway,
    conn_id: ConnId,
    receiver_id: i64,
    content: &str,
    message_type: &str,
) -> Result<Message, RouterError> {
    let sender = gateway
        .registry
        .identity_of(conn_id)
        .await
        .ok_or(RouterError::NotAuthenticated)?;

    let content = content.trim();
    if content.is_empty() {
        return Err(RouterError::EmptyContent);
    }

    let db = gateway.db.clone();
    let sender_id = sender.id;
    let content_owned = content.to_string();
    let message_type_owned = message_type.to_string();
    let row = tokio::task::spawn_blocking(move || {
        db.insert_message(sender_id, receiver_id, &content_owned, &message_type_owned)
    })
    .await
    .map_err(|e| RouterError::Persistence(e.into()))?
    .map_err(RouterError::Persistence)?;

    let message = row.into_message();

    gateway
        .registry
        .send_to_user(
            receiver_id,
            ServerEvent::NewMessage {
                message: message.clone(),
            },
        )
        .await;

    gateway
        .registry
        .send_to_conn(
            conn_id,
            ServerEvent::MessageSent {
                message: message.clone(),
            },
        )
        .await;

    Ok(message)
}
