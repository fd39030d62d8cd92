use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatcher::EventBus;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Forward every change event published on `bus` to one WebSocket
/// subscriber until either side goes away or `shutdown` fires. Inbound frames
/// are only read for Pong/Close bookkeeping; subscribers never send commands.
pub async fn stream_events(socket: WebSocket, bus: EventBus, shutdown: CancellationToken) {
    let (mut sender, mut receiver) = socket.split();

    let mut events = bus.subscribe();
    info!("Event subscriber connected ({} total)", bus.subscriber_count());

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = events.recv() => {
                    let payload = match result {
                        Ok(payload) => payload,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Event subscriber lagged, {} event(s) lost", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if sender.send(Message::Text(payload.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping subscriber", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        _ = shutdown.cancelled() => {
            send_task.abort();
            recv_task.abort();
        }
    }

    info!("Event subscriber disconnected");
}
