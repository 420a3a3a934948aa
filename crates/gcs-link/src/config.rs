use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Connection string, e.g. "udp:127.0.0.1:14552". The port is bound
    /// locally and the vehicle's address is learned from inbound traffic.
    pub endpoint: String,

    /// MAVLink ids we present (GCS side).
    pub sys_id: u8,
    pub comp_id: u8,

    /// Target system/component (FC side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    /// Heartbeat wait before a fresh link is declared dead.
    pub heartbeat_timeout_ms: Option<u64>,

    /// Blocking receive slice; also the stop-flag check interval.
    pub recv_timeout_ms: Option<u64>,

    /// Per-request mission download timeout.
    pub mission_timeout_ms: Option<u64>,
}

impl LinkConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            sys_id: 255,
            comp_id: 190,
            target_sys: 1,
            target_comp: 1,
            heartbeat_timeout_ms: None,
            recv_timeout_ms: None,
            mission_timeout_ms: None,
        }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.unwrap_or(5_000))
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms.unwrap_or(1_000))
    }

    pub fn mission_timeout(&self) -> Duration {
        Duration::from_millis(self.mission_timeout_ms.unwrap_or(5_000))
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new("udp:127.0.0.1:14552")
    }
}
