use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use courier_types::events::ServerEvent;
use courier_types::models::User;

/// Handle for one live transport session.
pub type ConnId = Uuid;

/// A broadcast frame tagged with its originating connection so each
/// send task can drop frames it produced itself ("all other clients").
#[derive(Debug, Clone)]
pub struct BroadcastFrame {
    pub origin: ConnId,
    pub event: ServerEvent,
}

/// Bidirectional in-memory index between live connections and
/// authenticated users. No persistence; state dies with the process,
/// leaving persisted presence rows stale until the next reconnect.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Broadcast channel for presence fan-out; every connection
    /// subscribes, authenticated or not.
    broadcast_tx: broadcast::Sender<BroadcastFrame>,
    /// All maps behind one lock so bind/unbind keep both directions
    /// consistent. No I/O happens under the lock.
    state: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    /// Every live connection: conn -> outbound channel
    connections: HashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>,
    /// user -> current connection (last bind wins)
    by_user: HashMap<i64, ConnId>,
    /// connection -> bound identity
    by_conn: HashMap<ConnId, User>,
}

impl Registry {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RegistryInner {
                broadcast_tx,
                state: RwLock::new(RegistryState::default()),
            }),
        }
    }

    /// Register a new live connection. Returns its handle and the
    /// receiving end of its outbound channel.
    pub async fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state.write().await.connections.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Subscribe to broadcast frames.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastFrame> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Bind a connection to an authenticated identity. Single active
    /// session per user: a later bind for the same user displaces the
    /// earlier connection's routing entry.
    pub async fn bind(&self, conn_id: ConnId, user: User) {
        let mut state = self.inner.state.write().await;
        if let Some(stale) = state.by_user.insert(user.id, conn_id) {
            if stale != conn_id {
                state.by_conn.remove(&stale);
            }
        }
        state.by_conn.insert(conn_id, user);
    }

    /// Remove a connection entirely. Returns the bound identity only
    /// if this connection still owned the user's routing entry; a
    /// stale disconnect after a newer bind returns None.
    pub async fn deregister(&self, conn_id: ConnId) -> Option<User> {
        let mut state = self.inner.state.write().await;
        state.connections.remove(&conn_id);
        let user = state.by_conn.remove(&conn_id)?;
        if state.by_user.get(&user.id) == Some(&conn_id) {
            state.by_user.remove(&user.id);
            Some(user)
        } else {
            None
        }
    }

    pub async fn identity_of(&self, conn_id: ConnId) -> Option<User> {
        self.inner.state.read().await.by_conn.get(&conn_id).cloned()
    }

    pub async fn connection_of(&self, user_id: i64) -> Option<ConnId> {
        self.inner.state.read().await.by_user.get(&user_id).copied()
    }

    /// Fire-and-forget delivery to one connection. Returns false if
    /// the connection is gone.
    pub async fn send_to_conn(&self, conn_id: ConnId, event: ServerEvent) -> bool {
        let state = self.inner.state.read().await;
        match state.connections.get(&conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Fire-and-forget delivery to a user's live connection, if any.
    pub async fn send_to_user(&self, user_id: i64, event: ServerEvent) -> bool {
        let state = self.inner.state.read().await;
        let Some(conn_id) = state.by_user.get(&user_id) else {
            return false;
        };
        match state.connections.get(conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Publish an event to every other live connection.
    pub fn broadcast_from(&self, origin: ConnId, event: ServerEvent) {
        let _ = self.inner.broadcast_tx.send(BroadcastFrame { origin, event });
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
