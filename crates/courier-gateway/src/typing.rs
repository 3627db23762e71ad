use courier_types::events::ServerEvent;

use crate::Gateway;
use crate::registry::ConnId;

/// Forward a typing-start signal to the receiver's live connection.
/// Best-effort and non-critical: unauthenticated senders and offline
/// receivers are silently ignored, and nothing is persisted.
pub async fn typing_start(gateway: &Gateway, conn_id: ConnId, receiver_id: i64) {
    let Some(sender) = gateway.registry.identity_of(conn_id).await else {
        return;
    };
    gateway
        .registry
        .send_to_user(
            receiver_id,
            ServerEvent::UserTyping {
                user_id: sender.id,
                username: sender.username,
            },
        )
        .await;
}

/// Forward a typing-stop signal. Same best-effort policy; a stop
/// arriving before its start is the client's idle timeout problem.
pub async fn typing_stop(gateway: &Gateway, conn_id: ConnId, receiver_id: i64) {
    let Some(sender) = gateway.registry.identity_of(conn_id).await else {
        return;
    };
    gateway
        .registry
        .send_to_user(
            receiver_id,
            ServerEvent::UserStoppedTyping { user_id: sender.id },
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use courier_db::Database;
    use courier_types::models::User;

    fn test_gateway() -> Gateway {
        Gateway::new(
            Arc::new(Database::open_in_memory().unwrap()),
            "test-secret".into(),
        )
    }

    #[tokio::test]
    async fn signals_reach_a_live_receiver() {
        let gateway = test_gateway();
        let (sender_conn, _rx1) = gateway.registry.register().await;
        let (receiver_conn, mut receiver_rx) = gateway.registry.register().await;
        gateway
            .registry
            .bind(sender_conn, User { id: 1, username: "alice".into(), avatar: None })
            .await;
        gateway
            .registry
            .bind(receiver_conn, User { id: 2, username: "bob".into(), avatar: None })
            .await;

        typing_start(&gateway, sender_conn, 2).await;
        typing_stop(&gateway, sender_conn, 2).await;

        assert!(matches!(
            receiver_rx.try_recv().unwrap(),
            ServerEvent::UserTyping { user_id: 1, .. }
        ));
        assert!(matches!(
            receiver_rx.try_recv().unwrap(),
            ServerEvent::UserStoppedTyping { user_id: 1 }
        ));
    }

    #[tokio::test]
    async fn offline_receiver_is_a_silent_noop() {
        let gateway = test_gateway();
        let (sender_conn, mut sender_rx) = gateway.registry.register().await;
        gateway
            .registry
            .bind(sender_conn, User { id: 1, username: "alice".into(), avatar: None })
            .await;

        typing_start(&gateway, sender_conn, 99).await;

        // No error event, nothing echoed back.
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unauthenticated_sender_is_ignored() {
        let gateway = test_gateway();
        let (sender_conn, mut sender_rx) = gateway.registry.register().await;
        let (receiver_conn, mut receiver_rx) = gateway.registry.register().await;
        gateway
            .registry
            .bind(receiver_conn, User { id: 2, username: "bob".into(), avatar: None })
            .await;

        typing_start(&gateway, sender_conn, 2).await;

        assert!(receiver_rx.try_recv().is_err());
        assert!(sender_rx.try_recv().is_err());
    }
}
