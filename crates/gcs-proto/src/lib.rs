pub mod mission;
pub mod telemetry;
