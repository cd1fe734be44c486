use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use tracing::{debug, info, warn};

use rapport_types::events::GatewayEvent;
use rapport_types::models::UserId;

use crate::hub::{Hub, HubClient};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Consecutive unanswered pings before the session is dropped.
const MAX_MISSED_PONGS: u8 = 2;

/// Drive one authenticated WebSocket session.
///
/// The session registers with the hub, then pumps its outbound queue to the
/// socket until either side goes away. It never touches the registry itself,
/// only the hub's command queue.
pub async fn handle_connection(socket: WebSocket, hub: Hub, user_id: UserId, queue_capacity: usize) {
    let (mut sender, mut receiver) = socket.split();

    if hub.is_online(user_id).await {
        info!("User {} already has a live session, replacing it", user_id);
    }

    let (client, mut outbound) = HubClient::new(user_id, queue_capacity);
    let key = client.key();
    hub.register(client);

    info!("User {} connected to gateway", user_id);

    if send_event(&mut sender, &GatewayEvent::Ready { user_id }).await.is_err() {
        hub.unregister(key);
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward routed messages -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                routed = outbound.recv() => {
                    // None: evicted, replaced by a newer session, or hub shut down
                    let Some(message) = routed else { break };
                    if send_event(&mut sender, &GatewayEvent::from(message)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_PONGS {
                            warn!("User {} missed {} pongs, dropping session", user_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Messages are sent over HTTP; the socket only carries control frames upstream.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                WsMessage::Close(_) => break,
                WsMessage::Text(text) => {
                    debug!(
                        "User {} sent unexpected text frame: {}",
                        user_id,
                        text.as_str().chars().take(200).collect::<String>()
                    );
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(key);
    info!("User {} disconnected from gateway", user_id);
}

async fn send_event<S>(sender: &mut S, event: &GatewayEvent) -> Result<(), ()>
where
    S: Sink<WsMessage> + Unpin,
{
    let text = serde_json::to_string(event).map_err(|e| {
        warn!("Failed to encode gateway event: {}", e);
    })?;
    sender.send(WsMessage::Text(text.into())).await.map_err(|_| ())
}
