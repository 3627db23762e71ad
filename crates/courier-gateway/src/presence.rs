use tracing::warn;

use courier_types::events::ServerEvent;
use courier_types::models::User;

use crate::Gateway;
use crate::registry::ConnId;

/// Persist the online transition and announce it to every other live
/// connection. Presence persistence is best-effort: a failed upsert is
/// logged and never blocks the broadcast.
pub async fn announce_online(gateway: &Gateway, user: &User, conn_id: ConnId) {
    let db = gateway.db.clone();
    let user_id = user.id;
    let connection_ref = conn_id.to_string();
    let result =
        tokio::task::spawn_blocking(move || db.upsert_presence_online(user_id, &connection_ref))
            .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Presence upsert failed for user {}: {}", user_id, e),
        Err(e) => warn!("Presence upsert task failed for user {}: {}", user_id, e),
    }

    gateway.registry.broadcast_from(
        conn_id,
        ServerEvent::UserOnline {
            user_id: user.id,
            username: user.username.clone(),
        },
    );
}

/// Persist the offline transition and announce it. Called only when
/// the disconnecting connection still owned the user's binding.
pub async fn announce_offline(gateway: &Gateway, user: &User, conn_id: ConnId) {
    let db = gateway.db.clone();
    let user_id = user.id;
    let result = tokio::task::spawn_blocking(move || db.mark_presence_offline(user_id)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Presence update failed for user {}: {}", user_id, e),
        Err(e) => warn!("Presence update task failed for user {}: {}", user_id, e),
    }

    gateway.registry.broadcast_from(
        conn_id,
        ServerEvent::UserOffline {
            user_id: user.id,
            username: user.username.clone(),
        },
    );
}
