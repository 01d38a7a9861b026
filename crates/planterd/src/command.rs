//! Actuator commands and their firmware codes.
//!
//! The firmware listens on a single command slot and tells actuators apart by
//! the integer written to it. Those integers only exist at the store boundary;
//! everything else works with [`Command`] and [`Actuator`].

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumIter;
use strum::EnumString;

/// A controllable actuator on the planter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Actuator {
    Pump,
    Fan,
}

impl Actuator {
    /// The command that switches this actuator on or off.
    pub fn command(self, on: bool) -> Command {
        match (self, on) {
            (Actuator::Pump, true) => Command::PumpOn,
            (Actuator::Pump, false) => Command::PumpOff,
            (Actuator::Fan, true) => Command::FanOn,
            (Actuator::Fan, false) => Command::FanOff,
        }
    }

    /// Field name of this actuator in the memory record.
    pub fn memory_field(self) -> &'static str {
        match self {
            Actuator::Pump => "pump_status",
            Actuator::Fan => "fan_status",
        }
    }
}

/// A command understood by the planter firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    PumpOn,
    PumpOff,
    FanOn,
    FanOff,
}

impl Command {
    /// Wire code written to the command slot.
    pub fn code(self) -> i64 {
        match self {
            Command::PumpOn => 129,
            Command::PumpOff => 128,
            Command::FanOn => 65,
            Command::FanOff => 64,
        }
    }
}
