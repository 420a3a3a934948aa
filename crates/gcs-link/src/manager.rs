use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{info, warn};

use crate::config::LinkConfig;
use crate::decode::classify;
use crate::error::LinkError;
use crate::event::{ConnectionState, EventBus, LinkEvent};
use crate::mission::{MissionAction, MissionDownload};
use crate::telemetry::TelemetryState;
use crate::transport::UdpLink;

const COMMAND_QUEUE_DEPTH: usize = 8;

enum Command {
    BeginTransfer,
}

/// Hosts the receive loop on a dedicated worker thread and owns the
/// transport for its whole life. Collaborators interact only through
/// `subscribe`, `begin_transfer` and `stop`.
pub struct LinkManager {
    bus: EventBus,
    cmd_tx: Sender<Command>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LinkManager {
    /// Spawn the worker and start connecting. Connection progress is
    /// reported through status events, not through this call: an endpoint
    /// that cannot be opened surfaces as a failed status.
    pub fn start(cfg: LinkConfig) -> Result<Self, LinkError> {
        let bus = EventBus::new();
        let (cmd_tx, cmd_rx) = bounded(COMMAND_QUEUE_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));

        let worker_bus = bus.clone();
        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("gcs-link".to_string())
            .spawn(move || run_link(cfg, worker_stop, cmd_rx, worker_bus))?;

        Ok(Self {
            bus,
            cmd_tx,
            stop,
            worker: Some(worker),
        })
    }

    /// New subscription to status/telemetry/mission events.
    pub fn subscribe(&self) -> Receiver<LinkEvent> {
        self.bus.subscribe()
    }

    /// Fire-and-forget trigger for a mission download. Safe from any
    /// thread; the worker fulfills it asynchronously. A trigger while a
    /// transfer is already outstanding is ignored.
    pub fn begin_transfer(&self) {
        if self.cmd_tx.try_send(Command::BeginTransfer).is_err() {
            warn!("link worker is not accepting commands");
        }
    }

    /// Whether the worker thread is still alive. False once the link has
    /// failed, or after `stop`.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Signal the worker to exit, join it, and release the transport.
    /// Idempotent: a second call is a no-op.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("link worker panicked");
            }
        }
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_link(cfg: LinkConfig, stop: Arc<AtomicBool>, cmd_rx: Receiver<Command>, bus: EventBus) {
    info!("connecting to vehicle at {}", cfg.endpoint);
    let mut link = match UdpLink::open(&cfg) {
        Ok(link) => link,
        Err(e) => {
            warn!("failed to open {}: {e}", cfg.endpoint);
            bus.publish(ConnectionState::Failed(format!("connection failed: {e}")).status_event());
            return;
        }
    };

    bus.publish(ConnectionState::AwaitingLiveness.status_event());
    match link.await_liveness(cfg.heartbeat_timeout()) {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                "no heartbeat within {:?}, giving up",
                cfg.heartbeat_timeout()
            );
            bus.publish(
                ConnectionState::Failed("no heartbeat from vehicle".to_string()).status_event(),
            );
            link.close();
            return;
        }
        Err(e) => {
            warn!("link error while waiting for heartbeat: {e}");
            bus.publish(ConnectionState::Failed(format!("link error: {e}")).status_event());
            link.close();
            return;
        }
    }

    info!("heartbeat received, link is up");
    bus.publish(ConnectionState::Connected.status_event());

    let mut telemetry = TelemetryState::new();
    let mut mission = MissionDownload::new(cfg.mission_timeout());

    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();

        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::BeginTransfer => {
                    if let Err(e) = apply_actions(mission.begin(now), &mut link, &bus) {
                        fail(e, &mut mission, &bus);
                        link.close();
                        return;
                    }
                }
            }
        }

        // A download whose request went unanswered aborts here.
        if let Err(e) = apply_actions(mission.tick(now), &mut link, &bus) {
            fail(e, &mut mission, &bus);
            link.close();
            return;
        }

        match link.receive(cfg.recv_timeout()) {
            Ok(None) => continue,
            Ok(Some(msg)) => {
                let decoded = classify(&msg);
                if telemetry.apply(&decoded) {
                    bus.publish(LinkEvent::Telemetry(telemetry.snapshot()));
                }
                let actions = mission.handle(&decoded, Instant::now());
                if let Err(e) = apply_actions(actions, &mut link, &bus) {
                    fail(e, &mut mission, &bus);
                    link.close();
                    return;
                }
            }
            Err(e) => {
                fail(e, &mut mission, &bus);
                link.close();
                return;
            }
        }
    }

    link.close();
    bus.publish(ConnectionState::Disconnected.status_event());
}

/// Execute the side effects the state machine asked for.
fn apply_actions(
    actions: Vec<MissionAction>,
    link: &mut UdpLink,
    bus: &EventBus,
) -> Result<(), LinkError> {
    for action in actions {
        match action {
            MissionAction::SendListRequest => link.request_mission_list()?,
            MissionAction::SendItemRequest(seq) => link.request_mission_item(seq)?,
            MissionAction::SendAck => link.ack_mission()?,
            MissionAction::Deliver(waypoints) => bus.publish(LinkEvent::Mission(waypoints)),
            MissionAction::Abort(reason) => bus.publish(LinkEvent::TransferAborted { reason }),
        }
    }
    Ok(())
}

/// Mid-session link failure: discard any partial download and go to Failed.
fn fail(e: LinkError, mission: &mut MissionDownload, bus: &EventBus) {
    warn!("link error: {e}");
    mission.reset();
    bus.publish(ConnectionState::Failed(format!("link error: {e}")).status_event());
}
