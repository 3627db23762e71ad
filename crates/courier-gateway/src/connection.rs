use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use courier_types::events::{ClientCommand, ServerEvent};

use crate::registry::ConnId;
use crate::{Gateway, auth, presence, receipts, router, typing};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive a single WebSocket connection from accept to disconnect.
///
/// The connection arrives anonymous and stays registered (able to
/// receive broadcasts and auth errors) until it either authenticates
/// via the `authenticate` command or disconnects. There is no auth
/// deadline; liveness is enforced only by the heartbeat.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut conn_rx) = gateway.registry.register().await;
    let mut broadcast_rx = gateway.registry.subscribe();
    info!("Connection {} opened", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events and broadcasts to the client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let frame = match result {
                        Ok(frame) => frame,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} frames", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    // Broadcasts go to every other connection, never
                    // back to the one that caused them.
                    if frame.origin == conn_id {
                        continue;
                    }

                    let text = serde_json::to_string(&frame.event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = conn_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client.
    let gw = gateway.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&gw, conn_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "Connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Unbind; the offline transition is announced only if this
    // connection still owned the user's binding (a reconnect may have
    // displaced it).
    match gateway.registry.deregister(conn_id).await {
        Some(user) => {
            presence::announce_offline(&gateway, &user, conn_id).await;
            info!("{} ({}) disconnected", user.username, user.id);
        }
        None => info!("Connection {} closed", conn_id),
    }
}

async fn handle_command(gateway: &Gateway, conn_id: ConnId, cmd: ClientCommand) {
    match cmd {
        ClientCommand::Authenticate { token } => {
            match auth::authenticate(gateway, conn_id, &token).await {
                Ok(user) => {
                    info!("{} ({}) authenticated on {}", user.username, user.id, conn_id);
                }
                Err(e) => {
                    warn!("Authentication failed on {}: {}", conn_id, e);
                    gateway
                        .registry
                        .send_to_conn(
                            conn_id,
                            ServerEvent::AuthError {
                                message: e.to_string(),
                            },
                        )
                        .await;
                }
            }
        }

        ClientCommand::PrivateMessage {
            receiver_id,
            content,
            message_type,
        } => {
            if let Err(e) =
                router::send_message(gateway, conn_id, receiver_id, &content, &message_type).await
            {
                warn!("Message from {} rejected: {}", conn_id, e);
                gateway
                    .registry
                    .send_to_conn(
                        conn_id,
                        ServerEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
        }

        ClientCommand::TypingStart { receiver_id } => {
            typing::typing_start(gateway, conn_id, receiver_id).await;
        }

        ClientCommand::TypingStop { receiver_id } => {
            typing::typing_stop(gateway, conn_id, receiver_id).await;
        }

        ClientCommand::MarkRead { sender_id } => {
            receipts::mark_read(gateway, conn_id, sender_id).await;
        }
    }
}
