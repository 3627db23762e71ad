use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;

use courier_types::api::Claims;
use courier_types::events::ServerEvent;
use courier_types::models::User;

use crate::registry::ConnId;
use crate::{Gateway, presence};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed, expired, or signature-mismatched credential
    #[error("invalid credential")]
    Invalid,
    /// The credential decoded but its user id resolves to nothing
    #[error("unknown user")]
    UnknownUser,
    #[error("persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

/// Authenticate a connection with a post-connect bearer token.
///
/// On success the connection is bound in the registry, acked with
/// `authenticated`, and the user's online transition is announced. On
/// failure the connection stays open and unauthenticated; the caller
/// reports the error to that connection only.
pub async fn authenticate(
    gateway: &Gateway,
    conn_id: ConnId,
    token: &str,
) -> Result<User, AuthError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(gateway.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::Invalid)?
    .claims;

    let db = gateway.db.clone();
    let row = tokio::task::spawn_blocking(move || db.get_user_by_id(claims.sub))
        .await
        .map_err(|e| AuthError::Persistence(e.into()))?
        .map_err(AuthError::Persistence)?;

    let user = row.ok_or(AuthError::UnknownUser)?.into_user();

    gateway.registry.bind(conn_id, user.clone()).await;
    gateway
        .registry
        .send_to_conn(conn_id, ServerEvent::Authenticated { user: user.clone() })
        .await;

    presence::announce_online(gateway, &user, conn_id).await;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use jsonwebtoken::{EncodingKey, Header, encode};

    use courier_db::Database;

    const SECRET: &str = "test-secret";

    fn test_gateway() -> Gateway {
        let db = Database::open_in_memory().unwrap();
        Gateway::new(Arc::new(db), SECRET.into())
    }

    fn token_for(user_id: i64, secret: &str) -> String {
        let claims = Claims {
            sub: user_id,
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_binds_acks_and_announces() {
        let gateway = test_gateway();
        let alice = gateway.db.create_user("alice", None).unwrap();

        let (peer_conn, mut peer_rx) = gateway.registry.register().await;
        let mut peer_broadcast = gateway.registry.subscribe();
        let (conn, mut rx) = gateway.registry.register().await;

        let user = authenticate(&gateway, conn, &token_for(alice, SECRET))
            .await
            .unwrap();
        assert_eq!(user.id, alice);
        assert_eq!(gateway.registry.connection_of(alice).await, Some(conn));

        match rx.try_recv().unwrap() {
            ServerEvent::Authenticated { user } => assert_eq!(user.username, "alice"),
            other => panic!("expected authenticated ack, got {:?}", other),
        }

        // Peers see the online transition; the frame is tagged with
        // the authenticating connection so its own send task skips it.
        let frame = peer_broadcast.recv().await.unwrap();
        assert_eq!(frame.origin, conn);
        match frame.event {
            ServerEvent::UserOnline { user_id, .. } => assert_eq!(user_id, alice),
            other => panic!("expected user_online, got {:?}", other),
        }

        // Presence row was upserted.
        let presence = gateway.db.get_presence(alice).unwrap().unwrap();
        assert!(presence.is_online);
        assert_eq!(presence.connection_ref.as_deref(), Some(conn.to_string().as_str()));

        // No targeted event leaked to the other connection.
        assert!(peer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let gateway = test_gateway();
        let (conn, _rx) = gateway.registry.register().await;

        let err = authenticate(&gateway, conn, "not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::Invalid));
        assert!(gateway.registry.identity_of(conn).await.is_none());
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let gateway = test_gateway();
        let alice = gateway.db.create_user("alice", None).unwrap();
        let (conn, _rx) = gateway.registry.register().await;

        let err = authenticate(&gateway, conn, &token_for(alice, "other-secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Invalid));
    }

    #[tokio::test]
    async fn unresolvable_id_is_unknown_user() {
        let gateway = test_gateway();
        let (conn, _rx) = gateway.registry.register().await;

        let err = authenticate(&gateway, conn, &token_for(424242, SECRET))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownUser));
        assert!(gateway.registry.identity_of(conn).await.is_none());
    }
}
