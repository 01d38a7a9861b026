//! The panel: the set of page elements the planter UI is built from.
//!
//! Each element is addressed by the id the page markup gives it and carries a
//! text, a CSS class and (for the camera) a media source. The markup decides
//! which elements exist; updating an element the markup does not have is a
//! silent no-op.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::command::Actuator;

/// Element ids used by the page markup.
pub mod ids {
    pub const SENSOR_DISTANCE: &str = "sensor-dist";
    pub const SENSOR_WATER: &str = "sensor-water";
    pub const SENSOR_SOIL: &str = "sensor-soil";
    pub const SENSOR_TEMPERATURE: &str = "sensor-temp";
    pub const SENSOR_HUMIDITY: &str = "sensor-humidity";
    pub const CAMERA_STREAM: &str = "camera-stream";
    pub const CAMERA_IP: &str = "ip-display";
    pub const CAMERA_STATUS: &str = "cam-status";
    pub const PUMP_BUTTON: &str = "btn-pump";
    pub const PUMP_TEXT: &str = "pumpText";
    pub const FAN_BUTTON: &str = "btn-fan";
    pub const FAN_TEXT: &str = "fanText";

    pub const ALL: [&str; 12] = [
        SENSOR_DISTANCE,
        SENSOR_WATER,
        SENSOR_SOIL,
        SENSOR_TEMPERATURE,
        SENSOR_HUMIDITY,
        CAMERA_STREAM,
        CAMERA_IP,
        CAMERA_STATUS,
        PUMP_BUTTON,
        PUMP_TEXT,
        FAN_BUTTON,
        FAN_TEXT,
    ];
}

/// Class applied to the camera status badge once a stream address is known.
pub const CAMERA_CONNECTED_CLASS: &str = "badge bg-danger";

/// User-facing strings rendered into the panel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Labels {
    pub pump_on: String,
    pub pump_off: String,
    pub fan_on: String,
    pub fan_off: String,
    pub camera_connected: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            pump_on: "Pump running".to_string(),
            pump_off: "Pump off".to_string(),
            fan_on: "Fan running".to_string(),
            fan_off: "Fan off".to_string(),
            camera_connected: "Connected".to_string(),
        }
    }
}

/// A single page element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Element {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Panel {
    elements: BTreeMap<String, Element>,
}

impl Panel {
    /// A panel whose markup contains every known element.
    pub fn standard() -> Self {
        Self::with_elements(ids::ALL)
    }

    pub fn with_elements<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elements: ids
                .into_iter()
                .map(|id| (id.into(), Element::default()))
                .collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.element(id)?.text.as_deref()
    }

    pub fn class(&self, id: &str) -> Option<&str> {
        self.element(id)?.class.as_deref()
    }

    pub fn src(&self, id: &str) -> Option<&str> {
        self.element(id)?.src.as_deref()
    }

    pub fn elements(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.elements.iter().map(|(id, e)| (id.as_str(), e))
    }

    /// Set the text of `id`. Returns false if the markup has no such element.
    pub fn set_text(&mut self, id: &str, text: impl Into<String>) -> bool {
        match self.elements.get_mut(id) {
            Some(element) => {
                element.text = Some(text.into());
                true
            }
            None => false,
        }
    }

    pub fn set_class(&mut self, id: &str, class: impl Into<String>) -> bool {
        match self.elements.get_mut(id) {
            Some(element) => {
                element.class = Some(class.into());
                true
            }
            None => false,
        }
    }

    pub fn set_src(&mut self, id: &str, src: impl Into<String>) -> bool {
        match self.elements.get_mut(id) {
            Some(element) => {
                element.src = Some(src.into());
                true
            }
            None => false,
        }
    }

    /// Render an actuator's button and label for its on/off state.
    ///
    /// Both elements must exist; otherwise nothing is changed.
    pub fn render_actuator(&mut self, actuator: Actuator, on: bool, labels: &Labels) {
        let (button, text) = match actuator {
            Actuator::Pump => (ids::PUMP_BUTTON, ids::PUMP_TEXT),
            Actuator::Fan => (ids::FAN_BUTTON, ids::FAN_TEXT),
        };
        if !self.contains(button) || !self.contains(text) {
            return;
        }

        let state = if on { "on" } else { "off" };
        self.set_class(
            button,
            format!("btn control-btn {}-btn-{} w-100", actuator, state),
        );
        let label = match (actuator, on) {
            (Actuator::Pump, true) => &labels.pump_on,
            (Actuator::Pump, false) => &labels.pump_off,
            (Actuator::Fan, true) => &labels.fan_on,
            (Actuator::Fan, false) => &labels.fan_off,
        };
        self.set_text(text, label.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_element_is_noop() {
        let mut panel = Panel::with_elements([ids::SENSOR_TEMPERATURE]);
        assert!(!panel.set_text(ids::SENSOR_HUMIDITY, "40%"));
        assert!(panel.set_text(ids::SENSOR_TEMPERATURE, "21°C"));
        assert_eq!(panel.text(ids::SENSOR_TEMPERATURE), Some("21°C"));
        assert_eq!(panel.element(ids::SENSOR_HUMIDITY), None);
    }

    #[test]
    fn test_render_actuator() {
        let labels = Labels::default();
        let mut panel = Panel::standard();

        panel.render_actuator(Actuator::Pump, true, &labels);
        assert_eq!(
            panel.class(ids::PUMP_BUTTON),
            Some("btn control-btn pump-btn-on w-100")
        );
        assert_eq!(panel.text(ids::PUMP_TEXT), Some("Pump running"));

        panel.render_actuator(Actuator::Fan, false, &labels);
        assert_eq!(
            panel.class(ids::FAN_BUTTON),
            Some("btn control-btn fan-btn-off w-100")
        );
        assert_eq!(panel.text(ids::FAN_TEXT), Some("Fan off"));
        assert_eq!(panel.text(ids::PUMP_TEXT), Some("Pump running"));
    }

    #[test]
    fn test_render_actuator_requires_both_elements() {
        let mut panel = Panel::with_elements([ids::PUMP_BUTTON]);
        panel.render_actuator(Actuator::Pump, true, &Labels::default());
        assert_eq!(panel.class(ids::PUMP_BUTTON), None);
    }

    #[test]
    fn test_serialize() {
        let mut panel = Panel::with_elements([ids::CAMERA_STATUS, ids::SENSOR_SOIL]);
        panel.set_text(ids::CAMERA_STATUS, "Connected");
        panel.set_class(ids::CAMERA_STATUS, CAMERA_CONNECTED_CLASS);
        insta::assert_snapshot!(
            serde_json::to_string(&panel).unwrap(),
            @r#"{"cam-status":{"text":"Connected","class":"badge bg-danger"},"sensor-soil":{}}"#
        );
    }
}
