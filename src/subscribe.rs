//! The two independent subscription channels: connection
//! state transitions, and applied-packet notifications.
//!
//! The state channel is a broadcast channel so every subscriber sees
//! every transition; the message channel is an ordered registry of
//! listener callbacks so a slow subscriber can be detected and dropped
//! independently of the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::model::{ChangedFields, DeviceId, ModelKey};

/// Backpressure limit for the state channel: a subscriber
/// more than this many messages behind is dropped with a warning rather
/// than stalling the reader task.
pub const STATE_CHANNEL_BACKLOG_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Authenticating,
    Bootstrapping,
    Connecting,
    Connected,
    Reconnecting,
    Closing,
    Closed,
    Failed,
}

/// `(action, object-ref, changed-fields, raw-packet)`, emitted once per
/// applied WebSocket packet in apply order.
#[derive(Debug, Clone)]
pub struct Notification {
    pub action: NotificationAction,
    pub model_key: ModelKey,
    pub id: DeviceId,
    pub changed_fields: ChangedFields,
    pub raw_packet: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Add,
    Update,
    Remove,
    /// Emitted once, before the graph is replaced wholesale by a full
    /// re-bootstrap — subscribers receive a synthetic reset notification
    /// before the new graph is visible.
    Reset,
}

type Listener = Box<dyn Fn(&Notification) + Send + Sync>;

struct Subscriber {
    id: u64,
    listener: Listener,
}

/// Owns both subscription channels. One instance lives inside
/// [`crate::client::ProtectClient`] and is shared with the reader task.
pub struct Hub {
    state_tx: broadcast::Sender<SessionState>,
    message_subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Idempotent unsubscribe handle for the message channel.
/// Dropping it does *not* unsubscribe; callers must invoke
/// [`Unsubscribe::unsubscribe`] explicitly rather than relying on
/// drop-based RAII.
pub struct Unsubscribe {
    id: u64,
    hub: Arc<Hub>,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        let mut subs = self.hub.message_subscribers.lock().unwrap();
        subs.retain(|s| s.id != self.id);
    }
}

impl Hub {
    pub fn new() -> Arc<Self> {
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_BACKLOG_LIMIT);
        Arc::new(Self {
            state_tx,
            message_subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Subscribes to connection-state transitions. Lagging subscribers
    /// see [`broadcast::error::RecvError::Lagged`] rather than blocking
    /// the publisher, which would otherwise be dropped after N unread messages.
    pub fn subscribe_state(&self) -> broadcast::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn publish_state(&self, state: SessionState) {
        if self.state_tx.receiver_count() > 0 {
            if let Err(e) = self.state_tx.send(state) {
                warn!(error = %e, "no active state subscribers");
            }
        }
    }

    /// Registers a callback invoked synchronously, in apply order, on
    /// the reader task for every applied packet. Subscribers must not
    /// block — the hub does not enforce this, it is a
    /// documented contract.
    pub fn subscribe_messages(self: &Arc<Self>, listener: Listener) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.message_subscribers
            .lock()
            .unwrap()
            .push(Subscriber { id, listener });
        Unsubscribe {
            id,
            hub: Arc::clone(self),
        }
    }

    pub fn publish_message(&self, notification: &Notification) {
        let subs = self.message_subscribers.lock().unwrap();
        for sub in subs.iter() {
            (sub.listener)(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_subscribers_receive_transitions_in_order() {
        let hub = Hub::new();
        let mut rx = hub.subscribe_state();
        hub.publish_state(SessionState::Authenticating);
        hub.publish_state(SessionState::Bootstrapping);
        assert_eq!(rx.try_recv().unwrap(), SessionState::Authenticating);
        assert_eq!(rx.try_recv().unwrap(), SessionState::Bootstrapping);
    }

    #[test]
    fn message_subscribers_are_called_synchronously_in_registration_order() {
        let hub = Hub::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        let _unsub_a = hub.subscribe_messages(Box::new(move |_n| order_a.lock().unwrap().push("a")));
        let order_b = Arc::clone(&order);
        let _unsub_b = hub.subscribe_messages(Box::new(move |_n| order_b.lock().unwrap().push("b")));

        hub.publish_message(&Notification {
            action: NotificationAction::Update,
            model_key: ModelKey::Camera,
            id: "cam1".to_string(),
            changed_fields: ChangedFields::new(),
            raw_packet: serde_json::json!({}),
        });

        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_stops_future_calls() {
        let hub = Hub::new();
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = Arc::clone(&calls);
        let unsub = hub.subscribe_messages(Box::new(move |_n| *calls_clone.lock().unwrap() += 1));

        let notification = Notification {
            action: NotificationAction::Add,
            model_key: ModelKey::Sensor,
            id: "s1".to_string(),
            changed_fields: ChangedFields::new(),
            raw_packet: serde_json::json!({}),
        };

        hub.publish_message(&notification);
        unsub.unsubscribe();
        unsub.unsubscribe();
        hub.publish_message(&notification);

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
