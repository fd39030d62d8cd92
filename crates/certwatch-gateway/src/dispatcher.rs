use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error};

use certwatch_types::events::ChangeEvent;

/// Capacity of the broadcast ring. A subscriber that falls further behind
/// than this loses the oldest events.
const BUS_CAPACITY: usize = 1024;

/// Single-topic broadcast channel for identity change events.
///
/// Events are encoded once at publish time and fanned out as shared JSON
/// text, so in-process and remote subscribers decode the exact same bytes.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    broadcast_tx: broadcast::Sender<Arc<str>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            inner: Arc::new(EventBusInner { broadcast_tx }),
        }
    }

    /// Subscribe to change events. Only events published after this call are
    /// received.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Fire-and-forget publish. Returns how many subscribers were reached;
    /// zero is not an error, the event is simply lost.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let payload: Arc<str> = match event.encode() {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to encode {} event for user {}: {}", event.action(), event.user().id, e);
                return 0;
            }
        };

        let reached = self.inner.broadcast_tx.send(payload).unwrap_or(0);
        debug!(
            "Published {} event for user {} to {} subscriber(s)",
            event.action(),
            event.user().id,
            reached
        );
        reached
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
