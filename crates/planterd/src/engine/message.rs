//! Events processed by the engine loop.
//!
//! Everything that mutates the panel or the actuator mirror arrives here, so
//! handlers never run concurrently with each other.

use serde_json::Value;
use tokio::sync::oneshot;

use crate::command::Actuator;
use crate::controller::Toggle;
use crate::reflector::Source;

#[derive(Debug)]
pub enum PanelEvent {
    /// The user asked to flip an actuator.
    Toggle {
        actuator: Actuator,
        reply: oneshot::Sender<Toggle>,
    },

    /// A subscribed location changed.
    Reflect { source: Source, value: Value },

    /// Tear down subscriptions and stop the loop.
    Shutdown,
}
