use serde::{Deserialize, Serialize};

/// One fly-to point of a downloaded mission.
///
/// Latitude/longitude in decimal degrees, altitude in the vertical unit of
/// the source mission item (relative meters for ArduPilot missions).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}
