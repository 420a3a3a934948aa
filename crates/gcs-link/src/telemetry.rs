use gcs_proto::telemetry::{keys, TelemetrySnapshot};

use crate::decode::Decoded;

/// Mutable owner of the telemetry snapshot.
///
/// Only the link worker touches this; everyone else gets owned copies via
/// `snapshot()`.
#[derive(Debug, Default)]
pub struct TelemetryState {
    snapshot: TelemetrySnapshot,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a classified message into the snapshot. Returns true only if
    /// at least one field actually changed value, so a high-rate link with
    /// static values does not trigger notification storms.
    pub fn apply(&mut self, msg: &Decoded) -> bool {
        match *msg {
            Decoded::Position {
                lat,
                lon,
                relative_alt,
            } => {
                let mut changed = self.snapshot.set(keys::LAT, lat);
                changed |= self.snapshot.set(keys::LON, lon);
                changed |= self.snapshot.set(keys::RELATIVE_ALT, relative_alt);
                changed
            }
            Decoded::FlightData {
                groundspeed,
                heading,
            } => {
                let mut changed = self.snapshot.set(keys::GROUNDSPEED, groundspeed);
                changed |= self.snapshot.set(keys::HEADING, heading);
                changed
            }
            Decoded::SystemStatus { battery_remaining } => {
                self.snapshot.set(keys::BATTERY, battery_remaining)
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.clone()
    }
}
