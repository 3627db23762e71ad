use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use courier_types::api::{
    ChatHistoryResponse, Claims, ConversationsResponse, UnreadCountsResponse,
};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` of the oldest
    /// message from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Conversation list projection: one summary per peer with shared
/// history, newest first. Recomputed from message rows on every call —
/// no cache sits between this and the read flags the gateway writes.
pub async fn get_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_conversations(claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(ConversationsResponse {
        conversations: rows.into_iter().map(|r| r.into_summary()).collect(),
    }))
}

/// Paginated history between the caller and one peer, ascending by
/// time. Fetching a page marks the peer's messages to the caller as
/// read, so the returned rows still show their pre-fetch read state.
pub async fn get_chat_history(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<ChatQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let limit = query.limit.min(200);
    let before = query.before;

    let (other_user, rows) = tokio::task::spawn_blocking(move || {
        let peer = db
            .get_user_by_id(user_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;

        let rows = db
            .get_chat_history(claims.sub, user_id, limit, before.as_deref())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        db.mark_messages_read(user_id, claims.sub)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>((peer, rows))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(ChatHistoryResponse {
        messages: rows.into_iter().map(|r| r.into_message()).collect(),
        other_user: other_user.into_user(),
    }))
}

/// Batch mark-as-read by peer. Idempotent; always 200.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.mark_messages_read(user_id, claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({ "message": "Messages marked as read" })))
}

/// Unread totals grouped by sender.
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let counts = tokio::task::spawn_blocking(move || db.unread_counts_by_sender(claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(UnreadCountsResponse {
        unread_counts: counts.into_iter().collect::<HashMap<i64, i64>>(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use courier_db::Database;

    use crate::state::AppStateInner;

    fn test_state() -> AppState {
        Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            jwt_secret: "test-secret".into(),
        })
    }

    fn claims_for(user_id: i64) -> Claims {
        Claims {
            sub: user_id,
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        }
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn history_for_unknown_peer_is_404() {
        let state = test_state();
        let alice = state.db.create_user("alice", None).unwrap();

        let err = get_chat_history(
            State(state),
            Path(424242),
            Query(ChatQuery { limit: 50, before: None }),
            Extension(claims_for(alice)),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_fetch_marks_peer_messages_read() {
        let state = test_state();
        let alice = state.db.create_user("alice", None).unwrap();
        let bob = state.db.create_user("bob", None).unwrap();
        state.db.insert_message(alice, bob, "hi", "text").unwrap();

        let resp = get_chat_history(
            State(state.clone()),
            Path(alice),
            Query(ChatQuery { limit: 50, before: None }),
            Extension(claims_for(bob)),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let history: ChatHistoryResponse = body_json(resp).await;
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.other_user.username, "alice");
        // The fetched page shows the pre-fetch read state...
        assert!(!history.messages[0].is_read);
        // ...but the rows themselves are now read.
        assert!(state.db.unread_counts_by_sender(bob).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unread_counts_follow_mark_read() {
        let state = test_state();
        let alice = state.db.create_user("alice", None).unwrap();
        let bob = state.db.create_user("bob", None).unwrap();
        state.db.insert_message(alice, bob, "one", "text").unwrap();
        state.db.insert_message(alice, bob, "two", "text").unwrap();

        let resp = unread_count(State(state.clone()), Extension(claims_for(bob)))
            .await
            .unwrap()
            .into_response();
        let counts: UnreadCountsResponse = body_json(resp).await;
        assert_eq!(counts.unread_counts.get(&alice), Some(&2));

        mark_read(State(state.clone()), Path(alice), Extension(claims_for(bob)))
            .await
            .unwrap();

        let resp = unread_count(State(state.clone()), Extension(claims_for(bob)))
            .await
            .unwrap()
            .into_response();
        let counts: UnreadCountsResponse = body_json(resp).await;
        assert!(counts.unread_counts.is_empty());
    }

    #[tokio::test]
    async fn conversations_projection_round_trips() {
        let state = test_state();
        let alice = state.db.create_user("alice", None).unwrap();
        let bob = state.db.create_user("bob", Some("bob.png")).unwrap();
        state.db.insert_message(bob, alice, "hey", "text").unwrap();

        let resp = get_conversations(State(state.clone()), Extension(claims_for(alice)))
            .await
            .unwrap()
            .into_response();
        let convos: ConversationsResponse = body_json(resp).await;
        assert_eq!(convos.conversations.len(), 1);
        let summary = &convos.conversations[0];
        assert_eq!(summary.peer_id, bob);
        assert_eq!(summary.peer_avatar.as_deref(), Some("bob.png"));
        assert_eq!(summary.last_message, "hey");
        assert_eq!(summary.unread_count, 1);
    }
}
