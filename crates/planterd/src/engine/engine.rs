use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::message::PanelEvent;
use crate::command::Actuator;
use crate::config::CameraConfig;
use crate::config::Config;
use crate::config::PathsConfig;
use crate::controller::Controller;
use crate::controller::Toggle;
use crate::panel::Labels;
use crate::panel::Panel;
use crate::reflector;
use crate::reflector::Reflector;
use crate::startup;
use crate::store::Store;

/// Capacity of the event channel feeding the engine loop
const EVENT_CHANNEL_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not running")]
    Stopped,
}

/// planterd engine
///
/// Owns the panel and the actuator controller and applies every event to them
/// in arrival order: toggles from the API and notifications from the
/// reflector's subscriptions. Readers get panel snapshots through a watch
/// channel and never block the loop.
pub struct Engine {
    store: Arc<dyn Store>,
    controller: Controller,
    panel: Panel,
    paths: PathsConfig,
    camera: CameraConfig,
    labels: Labels,

    /// Standing subscriptions, installed by `start()`
    reflector: Option<Reflector>,

    event_tx: mpsc::Sender<PanelEvent>,
    event_rx: mpsc::Receiver<PanelEvent>,

    /// Latest panel contents for readers
    snapshot_tx: watch::Sender<Panel>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let panel = Panel::with_elements(config.panel.elements.iter().cloned());
        let (snapshot_tx, _) = watch::channel(panel.clone());

        Self {
            controller: Controller::new(store.clone(), config.paths.clone()),
            store,
            panel,
            paths: config.paths.clone(),
            camera: config.camera.clone(),
            labels: config.panel.labels.clone(),
            reflector: None,
            event_tx,
            event_rx,
            snapshot_tx,
        }
    }

    /// Restore the actuator states, render them, then start reflecting the
    /// read-only locations.
    ///
    /// Toggles queued before this completes are handled once `run()` starts.
    pub async fn start(&mut self) {
        let state = startup::load_initial_state(self.store.as_ref(), &self.paths.memory).await;
        self.controller.seed(state);
        self.panel.render_actuator(Actuator::Pump, state.pump, &self.labels);
        self.panel.render_actuator(Actuator::Fan, state.fan, &self.labels);
        self.publish();

        let reflector =
            Reflector::install(self.store.as_ref(), &self.paths, self.event_tx.clone()).await;
        if reflector.is_empty() {
            warn!("No subscriptions installed, sensor readings will not update");
        } else {
            info!("Installed {} subscriptions", reflector.len());
        }
        self.reflector = Some(reflector);
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.event_tx.clone(),
            snapshot: self.snapshot_tx.subscribe(),
        }
    }

    /// Run the event loop until a shutdown is requested.
    pub async fn run(mut self) {
        info!("Engine starting");

        while let Some(event) = self.event_rx.recv().await {
            match event {
                PanelEvent::Toggle { actuator, reply } => {
                    let toggle = self.controller.toggle(actuator).await;
                    self.panel.render_actuator(actuator, toggle.on, &self.labels);
                    self.publish();
                    // The requester may have gone away; the toggle still happened.
                    let _ = reply.send(toggle);
                }
                PanelEvent::Reflect { source, value } => {
                    debug!("{} update: {}", source, value);
                    reflector::reflect(&mut self.panel, source, &value, &self.camera, &self.labels);
                    self.publish();
                }
                PanelEvent::Shutdown => break,
            }
        }

        if let Some(reflector) = self.reflector.take() {
            reflector.shutdown();
        }
        info!("Engine shutting down");
    }

    fn publish(&self) {
        self.snapshot_tx.send_if_modified(|current| {
            if *current == self.panel {
                false
            } else {
                *current = self.panel.clone();
                true
            }
        });
    }
}

/// Cloneable handle for talking to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<PanelEvent>,
    snapshot: watch::Receiver<Panel>,
}

impl EngineHandle {
    /// Flip an actuator and wait for the outcome.
    pub async fn toggle(&self, actuator: Actuator) -> Result<Toggle, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PanelEvent::Toggle { actuator, reply })
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Current panel contents.
    pub fn panel(&self) -> Panel {
        self.snapshot.borrow().clone()
    }

    /// A receiver that is notified whenever the panel changes.
    pub fn watch(&self) -> watch::Receiver<Panel> {
        self.snapshot.clone()
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.tx
            .send(PanelEvent::Shutdown)
            .await
            .map_err(|_| EngineError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::panel::ids;
    use crate::store::MemoryStore;

    async fn started(store: &MemoryStore) -> EngineHandle {
        let mut engine = Engine::new(Arc::new(store.clone()), &Config::default());
        engine.start().await;
        let handle = engine.handle();
        tokio::spawn(engine.run());
        handle
    }

    #[tokio::test]
    async fn test_start_renders_defaults_for_fresh_store() {
        let store = MemoryStore::new();
        let handle = started(&store).await;

        let panel = handle.panel();
        assert_eq!(
            panel.class(ids::PUMP_BUTTON),
            Some("btn control-btn pump-btn-off w-100")
        );
        assert_eq!(
            panel.class(ids::FAN_BUTTON),
            Some("btn control-btn fan-btn-off w-100")
        );
        assert_eq!(
            store.get("smart_planter/controls").await.unwrap(),
            Some(json!({"pump_status": 0, "fan_status": 0}))
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_updates_panel() {
        let store = MemoryStore::new();
        let handle = started(&store).await;

        let toggle = handle.toggle(Actuator::Pump).await.unwrap();
        assert!(toggle.on);
        assert!(toggle.persisted);

        let panel = handle.panel();
        assert_eq!(
            panel.class(ids::PUMP_BUTTON),
            Some("btn control-btn pump-btn-on w-100")
        );
        assert_eq!(panel.text(ids::PUMP_TEXT), Some("Pump running"));
        assert_eq!(panel.text(ids::FAN_TEXT), Some("Fan off"));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_engine() {
        let store = MemoryStore::new();
        let handle = started(&store).await;
        handle.shutdown().await.unwrap();

        // Queued behind the shutdown, so it is never answered.
        let result = handle.toggle(Actuator::Fan).await;
        assert!(matches!(result, Err(EngineError::Stopped)));
        assert!(store.get("toAltera").await.unwrap().is_none());
    }
}
