use mavlink::common::{MavCmd, MavMessage};

/// Classified inbound frame with the fields this core cares about already
/// scaled to engineering units.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Position {
        lat: f64,
        lon: f64,
        /// Altitude relative to home, meters.
        relative_alt: f64,
    },
    FlightData {
        groundspeed: f64,
        heading: f64,
    },
    SystemStatus {
        /// Remaining battery, 0.0-1.0.
        battery_remaining: f64,
    },
    MissionCount {
        count: u16,
    },
    MissionItem {
        seq: u16,
        /// Only NAV_WAYPOINT items yield a usable waypoint; other commands
        /// (takeoff, loiter, ...) are skipped but still advance the
        /// download sequence.
        nav_waypoint: bool,
        lat: f64,
        lon: f64,
        alt: f64,
    },
    Heartbeat,
    Ignored,
}

/// Classify one inbound frame.
///
/// The integer-degree and millimeter scalings mirror how the flight
/// controller encodes these fields, so the exact divisors matter.
pub fn classify(msg: &MavMessage) -> Decoded {
    match msg {
        MavMessage::GLOBAL_POSITION_INT(p) => Decoded::Position {
            lat: f64::from(p.lat) / 1e7,
            lon: f64::from(p.lon) / 1e7,
            relative_alt: f64::from(p.relative_alt) / 1000.0,
        },
        MavMessage::VFR_HUD(v) => Decoded::FlightData {
            groundspeed: f64::from(v.groundspeed),
            heading: f64::from(v.heading),
        },
        // battery_remaining == -1 means the autopilot has no estimate
        MavMessage::SYS_STATUS(s) if s.battery_remaining >= 0 => Decoded::SystemStatus {
            battery_remaining: f64::from(s.battery_remaining) / 100.0,
        },
        MavMessage::MISSION_COUNT(c) => Decoded::MissionCount { count: c.count },
        MavMessage::MISSION_ITEM_INT(item) => Decoded::MissionItem {
            seq: item.seq,
            nav_waypoint: matches!(item.command, MavCmd::MAV_CMD_NAV_WAYPOINT),
            lat: f64::from(item.x) / 1e7,
            lon: f64::from(item.y) / 1e7,
            alt: f64::from(item.z),
        },
        MavMessage::HEARTBEAT(_) => Decoded::Heartbeat,
        _ => Decoded::Ignored,
    }
}
