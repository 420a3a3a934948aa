//! End-to-end tests for the link manager against a fake vehicle speaking
//! MAVLink v2 over loopback UDP.

use std::io::Cursor;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use gcs_link::{LinkConfig, LinkEvent, LinkManager};
use gcs_proto::telemetry::keys;
use mavlink::common::{
    MavCmd, MavMessage, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, MISSION_COUNT_DATA,
    MISSION_ITEM_INT_DATA,
};
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;

const MAX_FRAME: usize = 280;

struct FakeVehicle {
    socket: UdpSocket,
    gcs: SocketAddr,
    sequence: u8,
}

impl FakeVehicle {
    fn new(gcs_port: u16) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        Self {
            socket,
            gcs: format!("127.0.0.1:{gcs_port}").parse().unwrap(),
            sequence: 0,
        }
    }

    fn send(&mut self, msg: &MavMessage) {
        let header = MavHeader {
            system_id: 1,
            component_id: 1,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);
        let mut buf = Vec::with_capacity(MAX_FRAME);
        mavlink::write_v2_msg(&mut buf, header, msg).unwrap();
        self.socket.send_to(&buf, self.gcs).unwrap();
    }

    fn heartbeat(&mut self) {
        self.send(&MavMessage::HEARTBEAT(HEARTBEAT_DATA::default()));
    }

    fn try_recv(&mut self) -> Option<MavMessage> {
        let mut buf = [0u8; MAX_FRAME];
        let (len, _) = self.socket.recv_from(&mut buf).ok()?;
        let mut reader = PeekReader::new(Cursor::new(&buf[..len]));
        mavlink::read_v2_msg::<MavMessage, _>(&mut reader)
            .ok()
            .map(|(_, msg)| msg)
    }

    fn expect<F>(&mut self, what: &str, pred: F) -> MavMessage
    where
        F: Fn(&MavMessage) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(msg) = self.try_recv() {
                if pred(&msg) {
                    return msg;
                }
            }
        }
        panic!("vehicle never received {what}");
    }
}

fn wait_for<F>(events: &Receiver<LinkEvent>, what: &str, pred: F) -> LinkEvent
where
    F: Fn(&LinkEvent) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or_else(|| panic!("timed out waiting for {what}"));
        match events.recv_timeout(remaining) {
            Ok(ev) if pred(&ev) => return ev,
            Ok(_) => continue,
            Err(e) => panic!("waiting for {what}: {e}"),
        }
    }
}

/// Keep heartbeating until the manager reports the link up.
fn connect(vehicle: &mut FakeVehicle, events: &Receiver<LinkEvent>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        assert!(Instant::now() < deadline, "link never connected");
        vehicle.heartbeat();
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(LinkEvent::Status {
                connected: true, ..
            }) => return,
            Ok(_) | Err(_) => continue,
        }
    }
}

fn config(port: u16) -> LinkConfig {
    let mut cfg = LinkConfig::new(format!("udp:127.0.0.1:{port}"));
    cfg.heartbeat_timeout_ms = Some(3_000);
    cfg.recv_timeout_ms = Some(50);
    cfg.mission_timeout_ms = Some(2_000);
    cfg
}

fn nav_item(seq: u16, x: i32, y: i32, z: f32) -> MavMessage {
    MavMessage::MISSION_ITEM_INT(MISSION_ITEM_INT_DATA {
        seq,
        command: MavCmd::MAV_CMD_NAV_WAYPOINT,
        x,
        y,
        z,
        target_system: 255,
        target_component: 190,
        ..Default::default()
    })
}

#[test]
fn end_to_end_telemetry_and_mission_download() {
    let mut manager = LinkManager::start(config(14561)).unwrap();
    let events = manager.subscribe();
    let mut vehicle = FakeVehicle::new(14561);

    connect(&mut vehicle, &events);

    // Position update flows into a telemetry snapshot with exact scaling.
    vehicle.send(&MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
        lat: 410000000,
        lon: 290000000,
        relative_alt: 100_000,
        ..Default::default()
    }));
    let ev = wait_for(&events, "telemetry snapshot", |ev| {
        matches!(ev, LinkEvent::Telemetry(_))
    });
    let LinkEvent::Telemetry(snap) = ev else {
        unreachable!()
    };
    assert_eq!(snap.get(keys::LAT), Some(41.0));
    assert_eq!(snap.get(keys::LON), Some(29.0));
    assert_eq!(snap.get(keys::RELATIVE_ALT), Some(100.0));

    // Mission download handshake.
    manager.begin_transfer();
    vehicle.expect("mission list request", |m| {
        matches!(m, MavMessage::MISSION_REQUEST_LIST(_))
    });
    vehicle.send(&MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
        count: 2,
        target_system: 255,
        target_component: 190,
        ..Default::default()
    }));

    vehicle.expect("request for item 0", |m| {
        matches!(m, MavMessage::MISSION_REQUEST_INT(req) if req.seq == 0)
    });
    vehicle.send(&nav_item(0, 410000000, 290000000, 50.0));

    vehicle.expect("request for item 1", |m| {
        matches!(m, MavMessage::MISSION_REQUEST_INT(req) if req.seq == 1)
    });
    vehicle.send(&nav_item(1, 410001000, 290001000, 60.0));

    vehicle.expect("final acknowledgement", |m| {
        matches!(m, MavMessage::MISSION_ACK(_))
    });

    let ev = wait_for(&events, "completed mission", |ev| {
        matches!(ev, LinkEvent::Mission(_))
    });
    let LinkEvent::Mission(waypoints) = ev else {
        unreachable!()
    };
    assert_eq!(waypoints.len(), 2);
    assert_eq!(waypoints[0].lat, 41.0);
    assert_eq!(waypoints[0].lon, 29.0);
    assert_eq!(waypoints[0].alt, 50.0);
    assert!((waypoints[1].lat - 41.0001).abs() < 1e-9);
    assert!((waypoints[1].lon - 29.0001).abs() < 1e-9);
    assert_eq!(waypoints[1].alt, 60.0);

    manager.stop();
    wait_for(&events, "disconnect status", |ev| {
        matches!(ev, LinkEvent::Status { connected: false, message } if message == "disconnected")
    });
    // Stopping again must not fault.
    manager.stop();
}

#[test]
fn missing_heartbeat_fails_the_link() {
    let mut cfg = config(14562);
    cfg.heartbeat_timeout_ms = Some(300);
    let mut manager = LinkManager::start(cfg).unwrap();
    let events = manager.subscribe();

    wait_for(&events, "liveness failure", |ev| {
        matches!(ev, LinkEvent::Status { connected: false, message }
            if message == "no heartbeat from vehicle")
    });

    // Stop after failure is still clean, twice over.
    manager.stop();
    manager.stop();
}

#[test]
fn stalled_transfer_aborts_and_link_survives() {
    let mut cfg = config(14563);
    cfg.mission_timeout_ms = Some(300);
    let mut manager = LinkManager::start(cfg).unwrap();
    let events = manager.subscribe();
    let mut vehicle = FakeVehicle::new(14563);

    connect(&mut vehicle, &events);

    manager.begin_transfer();
    vehicle.expect("mission list request", |m| {
        matches!(m, MavMessage::MISSION_REQUEST_LIST(_))
    });
    // Reply with a count, then go silent mid-session.
    vehicle.send(&MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
        count: 3,
        target_system: 255,
        target_component: 190,
        ..Default::default()
    }));

    wait_for(&events, "transfer abort", |ev| {
        matches!(ev, LinkEvent::TransferAborted { .. })
    });

    // The link itself is still alive: telemetry keeps flowing.
    vehicle.send(&MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
        lat: 420000000,
        lon: 280000000,
        relative_alt: 5_000,
        ..Default::default()
    }));
    wait_for(&events, "telemetry after abort", |ev| {
        matches!(ev, LinkEvent::Telemetry(snap) if snap.get(keys::LAT) == Some(42.0))
    });

    manager.stop();
}

#[test]
fn stop_from_connected_is_idempotent() {
    let mut manager = LinkManager::start(config(14564)).unwrap();
    let events = manager.subscribe();
    let mut vehicle = FakeVehicle::new(14564);

    connect(&mut vehicle, &events);

    manager.stop();
    wait_for(&events, "disconnect status", |ev| {
        matches!(ev, LinkEvent::Status { connected: false, message } if message == "disconnected")
    });
    manager.stop();
}
