//! Mirrors read-only store locations into the panel.
//!
//! Every location gets its own standing subscription. Notifications are
//! forwarded to the engine, which applies them with [`reflect`] so all panel
//! mutations happen on one task.

use serde_json::Value;
use strum::Display;
use strum::EnumIter;
use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::config::CameraConfig;
use crate::config::PathsConfig;
use crate::engine::PanelEvent;
use crate::engine::state::SensorSnapshot;
use crate::panel::CAMERA_CONNECTED_CLASS;
use crate::panel::Labels;
use crate::panel::Panel;
use crate::panel::ids;
use crate::store::Store;

/// A read-only store location reflected into the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    SensorSnapshot,
    Temperature,
    Humidity,
    CameraAddress,
}

impl Source {
    pub fn path(self, paths: &PathsConfig) -> &str {
        match self {
            Source::SensorSnapshot => paths.sensors.as_str(),
            Source::Temperature => paths.temperature.as_str(),
            Source::Humidity => paths.humidity.as_str(),
            Source::CameraAddress => paths.camera.as_str(),
        }
    }
}

/// Render a stored value as the page would: integral numbers without a
/// fractional part, strings verbatim.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
                    Some(f) => f.to_string(),
                    None => n.to_string(),
                }
            }
        }
        other => other.to_string(),
    }
}

/// The camera address if it is usable: a non-empty string or non-zero number.
fn camera_address(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(display_value(value)),
        _ => None,
    }
}

/// Apply one notification from `source` to the panel.
pub fn reflect(
    panel: &mut Panel,
    source: Source,
    value: &Value,
    camera: &CameraConfig,
    labels: &Labels,
) {
    match source {
        Source::SensorSnapshot => {
            // Structs also deserialize from arrays; only records carry readings.
            if !value.is_object() {
                debug!("Ignoring sensor snapshot that is not a record: {}", value);
                return;
            }
            let snapshot: SensorSnapshot = match serde_json::from_value(value.clone()) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!("Ignoring malformed sensor snapshot: {}", e);
                    return;
                }
            };

            let fields = [
                (snapshot.distance, ids::SENSOR_DISTANCE, " cm"),
                (snapshot.water_level, ids::SENSOR_WATER, "%"),
                (snapshot.soil_moisture, ids::SENSOR_SOIL, ""),
            ];
            for (reading, id, suffix) in fields {
                if let Some(reading) = reading {
                    panel.set_text(id, format!("{}{}", display_value(&reading), suffix));
                }
            }
        }
        Source::Temperature => {
            if !value.is_null() {
                panel.set_text(ids::SENSOR_TEMPERATURE, format!("{}°C", display_value(value)));
            }
        }
        Source::Humidity => {
            if !value.is_null() {
                panel.set_text(ids::SENSOR_HUMIDITY, format!("{}%", display_value(value)));
            }
        }
        Source::CameraAddress => {
            let Some(address) = camera_address(value) else {
                return;
            };
            if !panel.contains(ids::CAMERA_STREAM) {
                return;
            }

            panel.set_text(ids::CAMERA_IP, address.as_str());
            panel.set_src(ids::CAMERA_STREAM, camera.stream_url(&address));
            if panel.contains(ids::CAMERA_STATUS) {
                panel.set_text(ids::CAMERA_STATUS, labels.camera_connected.as_str());
                panel.set_class(ids::CAMERA_STATUS, CAMERA_CONNECTED_CLASS);
            }
        }
    }
}

/// The set of standing subscriptions feeding the engine.
///
/// Subscriptions live until [`Reflector::shutdown`] or until the reflector is
/// dropped.
pub struct Reflector {
    subscriptions: Vec<(Source, JoinHandle<()>)>,
}

impl Reflector {
    /// Subscribe to every source and forward notifications to `events`.
    ///
    /// A source whose subscription cannot be opened is logged and skipped.
    pub async fn install(
        store: &dyn Store,
        paths: &PathsConfig,
        events: mpsc::Sender<PanelEvent>,
    ) -> Self {
        let mut subscriptions = Vec::new();
        for source in Source::iter() {
            let path = source.path(paths);
            let mut subscription = match store.subscribe(path).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    error!("Failed to subscribe to {} at '{}': {}", source, path, e);
                    continue;
                }
            };
            info!("Listening for {} at '{}'", source, path);

            let events = events.clone();
            let task = tokio::spawn(async move {
                while let Some(value) = subscription.next().await {
                    if events.send(PanelEvent::Reflect { source, value }).await.is_err() {
                        break;
                    }
                }
            });
            subscriptions.push((source, task));
        }

        Self { subscriptions }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Tear down every subscription.
    pub fn shutdown(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for (source, task) in self.subscriptions.drain(..) {
            debug!("Stopping {} subscription", source);
            task.abort();
        }
    }
}

impl Drop for Reflector {
    fn drop(&mut self) {
        self.abort_all();
    }
}
