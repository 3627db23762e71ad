use tracing::warn;

use courier_types::events::ServerEvent;

use crate::Gateway;
use crate::registry::ConnId;

/// Transition every unread message from `sender_id` to this
/// connection's user to read, then notify the original sender if they
/// are live. Idempotent: a call that flips zero rows is still a
/// success. Persistence failure is correctness-visible and reported
/// back to the invoking connection.
pub async fn mark_read(gateway: &Gateway, conn_id: ConnId, sender_id: i64) {
    let Some(reader) = gateway.registry.identity_of(conn_id).await else {
        return;
    };

    let db = gateway.db.clone();
    let reader_id = reader.id;
    let result =
        tokio::task::spawn_blocking(move || db.mark_messages_read(sender_id, reader_id)).await;

    match result {
        Ok(Ok(_)) => {
            gateway
                .registry
                .send_to_user(
                    sender_id,
                    ServerEvent::MessagesRead {
                        reader_id: reader.id,
                        reader_username: reader.username,
                    },
                )
                .await;
        }
        Ok(Err(e)) => {
            warn!(
                "mark_read failed for reader {} sender {}: {}",
                reader_id, sender_id, e
            );
            gateway
                .registry
                .send_to_conn(
                    conn_id,
                    ServerEvent::Error {
                        message: "Failed to mark messages read".into(),
                    },
                )
                .await;
        }
        Err(e) => {
            warn!("mark_read task failed for reader {}: {}", reader_id, e);
            gateway
                .registry
                .send_to_conn(
                    conn_id,
                    ServerEvent::Error {
                        message: "Failed to mark messages read".into(),
                    },
                )
                .await;
        }
    }
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
    async fn marks_read_and_notifies_live_sender() {
        let gateway = test_gateway();
        let alice = gateway.db.create_user("alice", None).unwrap();
        let bob = gateway.db.create_user("bob", None).unwrap();
        gateway.db.insert_message(alice, bob, "hi", "text").unwrap();

        let (alice_conn, mut alice_rx) = gateway.registry.register().await;
        gateway
            .registry
            .bind(alice_conn, User { id: alice, username: "alice".into(), avatar: None })
            .await;
        let (bob_conn, _bob_rx) = gateway.registry.register().await;
        gateway
            .registry
            .bind(bob_conn, User { id: bob, username: "bob".into(), avatar: None })
            .await;

        mark_read(&gateway, bob_conn, alice).await;

        assert!(gateway.db.unread_counts_by_sender(bob).unwrap().is_empty());
        match alice_rx.try_recv().unwrap() {
            ServerEvent::MessagesRead {
                reader_id,
                reader_username,
            } => {
                assert_eq!(reader_id, bob);
                assert_eq!(reader_username, "bob");
            }
            other => panic!("expected messages_read, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_call_is_a_quiet_success() {
        let gateway = test_gateway();
        let alice = gateway.db.create_user("alice", None).unwrap();
        let bob = gateway.db.create_user("bob", None).unwrap();
        gateway.db.insert_message(alice, bob, "hi", "text").unwrap();

        let (bob_conn, mut bob_rx) = gateway.registry.register().await;
        gateway
            .registry
            .bind(bob_conn, User { id: bob, username: "bob".into(), avatar: None })
            .await;

        mark_read(&gateway, bob_conn, alice).await;
        mark_read(&gateway, bob_conn, alice).await;

        // No error event on either call; alice is offline so no
        // notification was queued anywhere either.
        assert!(bob_rx.try_recv().is_err());
        assert!(gateway.db.unread_counts_by_sender(bob).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_connection_is_a_noop() {
        let gateway = test_gateway();
        let alice = gateway.db.create_user("alice", None).unwrap();
        let bob = gateway.db.create_user("bob", None).unwrap();
        gateway.db.insert_message(alice, bob, "hi", "text").unwrap();

        let (conn, mut rx) = gateway.registry.register().await;
        mark_read(&gateway, conn, alice).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(
            gateway.db.unread_counts_by_sender(bob).unwrap(),
            vec![(alice, 1)]
        );
    }
}
