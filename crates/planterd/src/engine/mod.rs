mod engine;
mod message;
pub mod state;

pub use engine::Engine;
pub use engine::EngineError;
pub use engine::EngineHandle;
pub use message::PanelEvent;
pub use state::ActuatorState;
pub use state::MemoryRecord;
pub use state::SensorSnapshot;
