use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::error;
use tracing::info;

use crate::command::Actuator;
use crate::command::Command;
use crate::config::PathsConfig;
use crate::engine::state::ActuatorState;
use crate::store::Store;
use crate::store::child;

/// Outcome of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Toggle {
    pub actuator: Actuator,

    /// New local state of the actuator.
    pub on: bool,

    pub command: Command,

    /// Firmware code written to the command slot.
    pub code: i64,

    /// Whether the store accepted the write. The local state flips either way.
    pub persisted: bool,
}

/// Turns toggle requests into store writes.
///
/// Owns the local mirror of the actuator flags. The mirror is seeded once at
/// startup and afterwards only changes through [`Controller::toggle`].
pub struct Controller {
    store: Arc<dyn Store>,
    paths: PathsConfig,
    state: ActuatorState,
}

impl Controller {
    pub fn new(store: Arc<dyn Store>, paths: PathsConfig) -> Self {
        Self {
            store,
            paths,
            state: ActuatorState::default(),
        }
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn seed(&mut self, state: ActuatorState) {
        self.state = state;
    }

    /// Flip an actuator.
    ///
    /// The command code and the memory-record field are written in one atomic
    /// multi-path update. A failed update is logged and otherwise ignored: the
    /// local flag is flipped regardless and the outcome reports
    /// `persisted: false`.
    pub async fn toggle(&mut self, actuator: Actuator) -> Toggle {
        let on = !self.state.get(actuator);
        let command = actuator.command(on);
        info!("Toggling {} -> {}", actuator, command);

        let updates = vec![
            (self.paths.command.clone(), json!(command.code())),
            (
                child(&self.paths.memory, actuator.memory_field()),
                json!(u8::from(on)),
            ),
        ];
        let persisted = match self.store.update_paths(&updates).await {
            Ok(()) => true,
            Err(e) => {
                error!("Error updating {}: {}", actuator, e);
                false
            }
        };

        self.state.set(actuator, on);

        Toggle {
            actuator,
            on,
            command,
            code: command.code(),
            persisted,
        }
    }
}
