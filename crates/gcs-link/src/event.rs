use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use gcs_proto::mission::Waypoint;
use gcs_proto::telemetry::TelemetrySnapshot;
use tracing::warn;

/// Per-subscriber queue depth. A subscriber that falls this far behind
/// starts losing events instead of stalling the link worker.
const EVENT_QUEUE_DEPTH: usize = 256;

/// Link lifecycle, as seen by collaborators.
///
/// `Failed` and post-stop `Disconnected` are terminal: there is no automatic
/// reconnect, restarting the manager is up to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    AwaitingLiveness,
    Connected,
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// The `(connected, message)` status notification for this state.
    pub fn status_event(&self) -> LinkEvent {
        let message = match self {
            ConnectionState::Disconnected => "disconnected".to_string(),
            ConnectionState::AwaitingLiveness => "waiting for heartbeat".to_string(),
            ConnectionState::Connected => "connected".to_string(),
            ConnectionState::Failed(reason) => reason.clone(),
        };
        LinkEvent::Status {
            connected: self.is_connected(),
            message,
        }
    }
}

/// Notifications published by the link worker.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Connection status transition.
    Status { connected: bool, message: String },
    /// A telemetry-relevant field changed; owned copy of the snapshot.
    Telemetry(TelemetrySnapshot),
    /// A mission download finished; delivered exactly once per transfer.
    Mission(Vec<Waypoint>),
    /// A mission download was aborted; the link itself is still up.
    TransferAborted { reason: String },
}

/// Fan-out from the worker thread to collaborator threads.
///
/// Delivery is strictly non-blocking for the publisher: a full subscriber
/// queue drops the event, a disconnected subscriber is pruned.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<LinkEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<LinkEvent> {
        let (tx, rx) = bounded(EVENT_QUEUE_DEPTH);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn publish(&self, event: LinkEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("subscriber queue full, dropping event");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(connected: bool, message: &str) -> LinkEvent {
        LinkEvent::Status {
            connected,
            message: message.to_string(),
        }
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(status(true, "connected"));

        assert_eq!(a.recv().unwrap(), status(true, "connected"));
        assert_eq!(b.recv().unwrap(), status(true, "connected"));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(status(false, "disconnected"));
        assert_eq!(keep.recv().unwrap(), status(false, "disconnected"));
    }

    #[test]
    fn publish_never_blocks_on_a_full_queue() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        for i in 0..EVENT_QUEUE_DEPTH + 10 {
            bus.publish(status(false, &i.to_string()));
        }
        // The subscriber lost the overflow but the publisher never stalled.
        assert_eq!(rx.len(), EVENT_QUEUE_DEPTH);
    }

    #[test]
    fn failed_state_surfaces_its_reason() {
        let state = ConnectionState::Failed("no heartbeat from vehicle".to_string());
        assert_eq!(
            state.status_event(),
            status(false, "no heartbeat from vehicle")
        );
        assert!(ConnectionState::Connected.is_connected());
        assert!(!state.is_connected());
    }
}
