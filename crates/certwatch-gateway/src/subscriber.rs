use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use certwatch_db::Database;
use certwatch_types::api::INTERNAL_TOKEN_HEADER;
use certwatch_types::events::ChangeEvent;

/// Pause between reconnect attempts when the event stream drops.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// What happened to one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { id: i64, action: &'static str },
    Discarded(String),
    Failed(String),
}

/// Decode one payload and upsert the mirrored profile. Never panics and never
/// retries: bad payloads are discarded, storage failures are reported.
pub async fn apply_payload(db: &Arc<Database>, raw: &str) -> ApplyOutcome {
    let event = match ChangeEvent::decode(raw) {
        Ok(event) => event,
        Err(e) => return ApplyOutcome::Discarded(e.to_string()),
    };

    let action = event.action();
    let user = event.into_user();
    let id = user.id;

    let db = db.clone();
    match tokio::task::spawn_blocking(move || db.upsert_profile(&user)).await {
        Ok(Ok(())) => ApplyOutcome::Applied { id, action },
        Ok(Err(e)) => ApplyOutcome::Failed(format!("upsert of profile {id} failed: {e}")),
        Err(e) => ApplyOutcome::Failed(format!("spawn_blocking join error: {e}")),
    }
}

async fn apply_and_log(db: &Arc<Database>, raw: &str) -> ApplyOutcome {
    let outcome = apply_payload(db, raw).await;
    match &outcome {
        ApplyOutcome::Applied { id, action } => info!("Mirrored {} event for user {}", action, id),
        ApplyOutcome::Discarded(reason) => {
            let preview: String = raw.chars().take(200).collect();
            warn!("Discarded change event: {} -- raw: {}", reason, preview)
        }
        ApplyOutcome::Failed(reason) => error!("Change event not applied: {}", reason),
    }
    outcome
}

/// Consume events from an in-process bus until `shutdown` fires or the bus
/// is dropped.
pub async fn run_local(
    db: Arc<Database>,
    mut events: broadcast::Receiver<Arc<str>>,
    shutdown: CancellationToken,
) {
    info!("Profile mirror subscribed to in-process event bus");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = events.recv() => match result {
                Ok(payload) => {
                    apply_and_log(&db, &payload).await;
                }
                Err(RecvError::Lagged(n)) => warn!("Profile mirror lagged, {} event(s) lost", n),
                Err(RecvError::Closed) => break,
            },
        }
    }
    info!("Profile mirror subscriber stopped");
}

/// Consume events from the auth service's WebSocket stream. Waits
/// `reconnect_delay` and reconnects whenever the stream drops; events
/// published while disconnected are not replayed.
pub async fn run_remote(
    db: Arc<Database>,
    url: String,
    internal_token: Option<String>,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = connect(&url, internal_token.as_deref()) => result,
        };

        match connected {
            Ok(stream) => {
                info!("Profile mirror connected to event stream at {}", url);
                consume(&db, stream, &shutdown).await;
                if shutdown.is_cancelled() {
                    break;
                }
                warn!("Event stream closed; events published until reconnect are lost");
            }
            Err(e) => warn!("Failed to connect to event stream at {}: {}", url, e),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    info!("Profile mirror subscriber stopped");
}

type EventStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(url: &str, internal_token: Option<&str>) -> Result<EventStream> {
    let mut request = url.into_client_request()?;
    if let Some(token) = internal_token {
        request
            .headers_mut()
            .insert(INTERNAL_TOKEN_HEADER, HeaderValue::from_str(token)?);
    }
    let (stream, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

async fn consume(db: &Arc<Database>, mut stream: EventStream, shutdown: &CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Err(e) = stream.close(None).await {
                    warn!("Error closing event stream: {}", e);
                }
                return;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    apply_and_log(db, &text).await;
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Event stream error: {}", e);
                    return;
                }
            },
        }
    }
}
