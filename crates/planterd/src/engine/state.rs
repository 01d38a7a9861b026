use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::command::Actuator;

/// Deserialize an actuator flag stored as `0`/`1`.
///
/// The record is written by more than one client over time, so besides the
/// integers this also accepts booleans and `null`. Anything other than `1` or
/// `true` reads as off.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct Flag;

    impl<'de> de::Visitor<'de> for Flag {
        type Value = u8;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("0, 1, boolean, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(0)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(0)
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(u8::from(v))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(u8::from(v == 1))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(u8::from(v == 1))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(u8::from(v == 1.0))
        }

        fn visit_str<E>(self, _v: &str) -> Result<Self::Value, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(Flag)
}

/// Advisory record of the last commanded actuator states, kept in the store
/// so a freshly started panel can restore its buttons.
///
/// This is what the panel last asked for, not what the device confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub pump_status: u8,

    #[serde(default, deserialize_with = "deserialize_flag")]
    pub fan_status: u8,
}

impl MemoryRecord {
    pub fn to_value(self) -> Value {
        serde_json::json!({
            "pump_status": self.pump_status,
            "fan_status": self.fan_status,
        })
    }
}

/// Local mirror of the actuator flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ActuatorState {
    pub pump: bool,
    pub fan: bool,
}

impl ActuatorState {
    pub fn get(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Pump => self.pump,
            Actuator::Fan => self.fan,
        }
    }

    pub fn set(&mut self, actuator: Actuator, on: bool) {
        match actuator {
            Actuator::Pump => self.pump = on,
            Actuator::Fan => self.fan = on,
        }
    }
}

impl From<MemoryRecord> for ActuatorState {
    fn from(record: MemoryRecord) -> Self {
        Self {
            pump: record.pump_status == 1,
            fan: record.fan_status == 1,
        }
    }
}

/// Latest readings written by the firmware to the sensor location.
///
/// Fields are kept as raw values so they render exactly as reported.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SensorSnapshot {
    /// Distance reading, rendered in centimetres.
    #[serde(rename = "A", default)]
    pub distance: Option<Value>,

    /// Water level, rendered as a percentage.
    #[serde(rename = "B", default)]
    pub water_level: Option<Value>,

    /// Soil moisture, rendered without a unit.
    #[serde(rename = "C", default)]
    pub soil_moisture: Option<Value>,
}
