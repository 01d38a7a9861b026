pub mod api;
pub mod command;
pub mod config;
pub mod controller;
pub mod engine;
pub mod panel;
pub mod reflector;
pub mod startup;
pub mod store;

pub use command::Actuator;
pub use command::Command;
pub use config::Config;
pub use config::LogLevel;
pub use controller::Controller;
pub use controller::Toggle;
pub use engine::ActuatorState;
pub use engine::Engine;
pub use engine::EngineHandle;
pub use panel::Panel;
pub use store::MemoryStore;
pub use store::Store;
