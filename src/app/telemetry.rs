//! Query reply serialisation.
//!
//! ```json
//! {"PT1":[1520,312.4,0.4127],"LC1":[1518,-0.3,0.0011],"actuators":[0,0,1,0,0,0,0,0]}
//! ```
//!
//! One entry per sensor in registration order, `[time_ms, value, raw]`,
//! then every channel state as 0/1.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::drivers::valves::CHANNEL_COUNT;
use crate::sensors::{Reading, SensorRegistry};

/// Snapshot of every sensor and channel, ready to serialise.
pub struct QueryReply<'a> {
    sensors: &'a SensorRegistry,
    actuators: [bool; CHANNEL_COUNT],
}

impl<'a> QueryReply<'a> {
    pub fn new(sensors: &'a SensorRegistry, actuators: [bool; CHANNEL_COUNT]) -> Self {
        Self { sensors, actuators }
    }

    /// One-line JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::error!("Telemetry: serialise failed: {e}");
            String::from("{}")
        })
    }
}

fn triple(r: Reading) -> (u64, f32, f32) {
    (r.time_ms, r.value, r.raw)
}

impl Serialize for QueryReply<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sensors.len() + 1))?;
        for sensor in self.sensors.iter() {
            map.serialize_entry(sensor.name(), &triple(sensor.last_data()))?;
        }
        let bits = self.actuators.map(u8::from);
        map.serialize_entry("actuators", &bits)?;
        map.end()
    }
}
