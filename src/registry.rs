//! In-memory view of known devices and their active alarms
//!
//! Tracks what the message stream reveals: per-device freshness, the
//! alarming flag, and an acknowledgeable list of active alarms. Purely
//! in-memory; nothing survives a restart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub device_id: String,
    pub last_update: DateTime<Utc>,
    pub alarming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveAlarm {
    pub device_id: String,
    pub raised_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Device and alarm bookkeeping fed by the message loop.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceState>,
    alarms: Vec<ActiveAlarm>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation for a device. A rising alarm edge opens a
    /// new active alarm; a clean observation clears the flag but leaves
    /// the alarm entry for acknowledgement.
    pub fn observe_status(&mut self, device_id: &str, alarming: bool, at: DateTime<Utc>) {
        let entry = self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceState {
                device_id: device_id.to_string(),
                last_update: at,
                alarming: false,
            });

        let rising_edge = alarming && !entry.alarming;
        entry.last_update = at;
        entry.alarming = alarming;

        if rising_edge {
            self.alarms.push(ActiveAlarm {
                device_id: device_id.to_string(),
                raised_at: at,
                acknowledged: false,
            });
        }
    }

    /// Acknowledge every open alarm for a device and clear its alarming
    /// flag. Returns true when anything changed.
    pub fn acknowledge(&mut self, device_id: &str) -> bool {
        let mut changed = false;

        for alarm in &mut self.alarms {
            if alarm.device_id == device_id && !alarm.acknowledged {
                alarm.acknowledged = true;
                changed = true;
            }
        }

        if let Some(device) = self.devices.get_mut(device_id) {
            if device.alarming {
                device.alarming = false;
                changed = true;
            }
        }

        changed
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceState> {
        self.devices.get(device_id)
    }

    /// All known devices, sorted by id for stable output.
    pub fn devices(&self) -> Vec<&DeviceState> {
        let mut devices: Vec<_> = self.devices.values().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    /// Alarms not yet acknowledged, oldest first.
    pub fn active_alarms(&self) -> Vec<&ActiveAlarm> {
        self.alarms.iter().filter(|a| !a.acknowledged).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_edge_opens_one_alarm() {
        let mut registry = DeviceRegistry::new();
        let t = Utc::now();

        registry.observe_status("sensor7", true, t);
        registry.observe_status("sensor7", true, t);

        assert_eq!(registry.active_alarms().len(), 1);
        assert!(registry.device("sensor7").unwrap().alarming);
    }

    #[test]
    fn test_clean_observation_clears_flag_but_keeps_alarm() {
        let mut registry = DeviceRegistry::new();
        let t = Utc::now();

        registry.observe_status("sensor7", true, t);
        registry.observe_status("sensor7", false, t);

        assert!(!registry.device("sensor7").unwrap().alarming);
        assert_eq!(registry.active_alarms().len(), 1);
    }

    #[test]
    fn test_acknowledge_clears_alarm_and_flag() {
        let mut registry = DeviceRegistry::new();
        let t = Utc::now();

        registry.observe_status("sensor7", true, t);
        assert!(registry.acknowledge("sensor7"));

        assert!(registry.active_alarms().is_empty());
        assert!(!registry.device("sensor7").unwrap().alarming);

        // Nothing left to acknowledge
        assert!(!registry.acknowledge("sensor7"));
    }

    #[test]
    fn test_new_rising_edge_after_acknowledge_reopens() {
        let mut registry = DeviceRegistry::new();
        let t = Utc::now();

        registry.observe_status("sensor7", true, t);
        registry.acknowledge("sensor7");
        registry.observe_status("sensor7", true, t);

        assert_eq!(registry.active_alarms().len(), 1);
    }

    #[test]
    fn test_devices_sorted_by_id() {
        let mut registry = DeviceRegistry::new();
        let t = Utc::now();

        registry.observe_status("b", false, t);
        registry.observe_status("a", false, t);

        let ids: Vec<_> = registry.devices().iter().map(|d| d.device_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
