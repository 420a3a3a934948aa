//! Vehicle-link protocol manager.
//!
//! Owns the MAVLink connection to the flight controller: decodes the inbound
//! message stream, maintains derived telemetry state, runs the mission
//! download handshake, and publishes status/telemetry/mission events to
//! collaborators without ever blocking the receive loop on them.

pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod manager;
pub mod mission;
pub mod telemetry;
pub mod transport;

pub use config::LinkConfig;
pub use error::LinkError;
pub use event::{ConnectionState, LinkEvent};
pub use manager::LinkManager;
