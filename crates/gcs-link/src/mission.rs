use std::time::{Duration, Instant};

use gcs_proto::mission::Waypoint;
use tracing::{debug, info, warn};

use crate::decode::Decoded;

/// What the lifecycle controller must do after feeding the state machine.
///
/// The machine itself never touches the transport or the event bus; it only
/// emits these, which keeps every transition unit-testable.
#[derive(Debug, Clone, PartialEq)]
pub enum MissionAction {
    SendListRequest,
    SendItemRequest(u16),
    SendAck,
    /// The finished, ordered waypoint list. Emitted exactly once per
    /// successful download.
    Deliver(Vec<Waypoint>),
    /// Session aborted (timeout); the partial list is discarded.
    Abort(String),
}

#[derive(Debug)]
struct Session {
    expected: u16,
    items: Vec<Waypoint>,
    /// Invariant: also the number of items processed so far; non-waypoint
    /// items advance it without appending.
    next_index: u16,
}

#[derive(Debug)]
enum Phase {
    Idle,
    AwaitingCount { deadline: Instant },
    RequestingItem { session: Session, deadline: Instant },
}

/// Mission download handshake:
///
/// ```text
/// Idle --begin--> AwaitingCount --count--> RequestingItem(0) --item--> ...
///   ... --last item--> deliver list, send ack, back to Idle
/// ```
///
/// Out-of-order items are discarded without a re-request, trusting the
/// transport's delivery order. A request left unanswered past `timeout`
/// aborts the session and returns to Idle.
pub struct MissionDownload {
    phase: Phase,
    timeout: Duration,
}

impl MissionDownload {
    pub fn new(timeout: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            timeout,
        }
    }

    pub fn in_progress(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Start a download. No-op while one is already outstanding, so a
    /// double-clicked UI button cannot corrupt the session.
    pub fn begin(&mut self, now: Instant) -> Vec<MissionAction> {
        if self.in_progress() {
            debug!("mission download already in progress, ignoring begin request");
            return Vec::new();
        }
        info!("requesting mission list from vehicle");
        self.phase = Phase::AwaitingCount {
            deadline: now + self.timeout,
        };
        vec![MissionAction::SendListRequest]
    }

    pub fn handle(&mut self, msg: &Decoded, now: Instant) -> Vec<MissionAction> {
        match *msg {
            Decoded::MissionCount { count } => self.on_count(count, now),
            Decoded::MissionItem {
                seq,
                nav_waypoint,
                lat,
                lon,
                alt,
            } => self.on_item(seq, nav_waypoint, Waypoint { lat, lon, alt }, now),
            _ => Vec::new(),
        }
    }

    /// Abort the session if the vehicle has gone quiet on us.
    pub fn tick(&mut self, now: Instant) -> Vec<MissionAction> {
        let expired = match &self.phase {
            Phase::Idle => false,
            Phase::AwaitingCount { deadline } | Phase::RequestingItem { deadline, .. } => {
                now >= *deadline
            }
        };
        if !expired {
            return Vec::new();
        }
        warn!("mission download timed out, discarding session");
        self.phase = Phase::Idle;
        vec![MissionAction::Abort(
            "no response from vehicle within mission timeout".to_string(),
        )]
    }

    /// Drop any in-progress session, e.g. on link loss. The partial list is
    /// never delivered.
    pub fn reset(&mut self) {
        if self.in_progress() {
            warn!("discarding partial mission download");
        }
        self.phase = Phase::Idle;
    }

    fn on_count(&mut self, count: u16, now: Instant) -> Vec<MissionAction> {
        if !matches!(self.phase, Phase::AwaitingCount { .. }) {
            debug!("unsolicited MISSION_COUNT ({count}) discarded");
            return Vec::new();
        }
        info!("vehicle reports {count} mission items");
        if count == 0 {
            self.phase = Phase::Idle;
            return vec![MissionAction::Deliver(Vec::new()), MissionAction::SendAck];
        }
        self.phase = Phase::RequestingItem {
            session: Session {
                expected: count,
                items: Vec::with_capacity(count as usize),
                next_index: 0,
            },
            deadline: now + self.timeout,
        };
        vec![MissionAction::SendItemRequest(0)]
    }

    fn on_item(
        &mut self,
        seq: u16,
        nav_waypoint: bool,
        waypoint: Waypoint,
        now: Instant,
    ) -> Vec<MissionAction> {
        let Phase::RequestingItem { session, deadline } = &mut self.phase else {
            debug!("mission item {seq} outside a download session discarded");
            return Vec::new();
        };
        if seq != session.next_index {
            debug!(
                "out-of-order mission item {seq} (expected {}) discarded",
                session.next_index
            );
            return Vec::new();
        }

        if nav_waypoint {
            session.items.push(waypoint);
        } else {
            debug!("mission item {seq} is not a navigation waypoint, skipping");
        }
        session.next_index += 1;

        if session.next_index < session.expected {
            *deadline = now + self.timeout;
            vec![MissionAction::SendItemRequest(session.next_index)]
        } else {
            let items = std::mem::take(&mut session.items);
            info!("mission download complete ({} waypoints)", items.len());
            self.phase = Phase::Idle;
            vec![MissionAction::Deliver(items), MissionAction::SendAck]
        }
    }
}
