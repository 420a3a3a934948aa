use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field names used in telemetry snapshots.
///
/// Collaborators read snapshots by key; an absent key means the value has
/// never been observed on the link.
pub mod keys {
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";
    /// Altitude relative to home, meters.
    pub const RELATIVE_ALT: &str = "alt";
    /// Ground speed, m/s.
    pub const GROUNDSPEED: &str = "groundspeed";
    /// Heading, degrees 0-359.
    pub const HEADING: &str = "heading";
    /// Remaining battery as a 0.0-1.0 fraction.
    pub const BATTERY: &str = "battery_remaining";
}

/// Latest known value for each tracked flight parameter.
///
/// Keys are populated lazily as matching messages arrive and are never
/// removed. Published snapshots are owned copies, so a consumer can hold or
/// mutate one without ever observing a partial update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    fields: BTreeMap<String, f64>,
}

impl TelemetrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }

    /// Merge one field, returning true only if the stored value actually
    /// changed (a re-received identical value is not a change).
    pub fn set(&mut self, key: &str, value: f64) -> bool {
        match self.fields.get(key) {
            Some(current) if *current == value => false,
            _ => {
                self.fields.insert(key.to_string(), value);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_populate_lazily() {
        let mut snap = TelemetrySnapshot::new();
        assert!(snap.is_empty());
        assert_eq!(snap.get(keys::LAT), None);

        assert!(snap.set(keys::LAT, 41.0));
        assert_eq!(snap.get(keys::LAT), Some(41.0));
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn set_suppresses_unchanged_values() {
        let mut snap = TelemetrySnapshot::new();
        assert!(snap.set(keys::HEADING, 90.0));
        assert!(!snap.set(keys::HEADING, 90.0));
        assert!(snap.set(keys::HEADING, 91.0));
    }

    #[test]
    fn clones_are_independent() {
        let mut snap = TelemetrySnapshot::new();
        snap.set(keys::LAT, 41.0);

        let mut published = snap.clone();
        published.set(keys::LAT, 0.0);
        published.set(keys::LON, 0.0);

        assert_eq!(snap.get(keys::LAT), Some(41.0));
        assert_eq!(snap.get(keys::LON), None);
    }
}
