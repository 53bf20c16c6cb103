use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ViewfinderError;
use crate::types::Rotation;

/// Which native sink element the viewfinder asks the media framework for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Factory name of the sink element.
    #[serde(alias = "viewfinderSink")]
    pub element: String,
    /// Instance name given to the element inside the pipeline.
    pub name: String,
    /// Also offer DMA-BUF caps so the producer can hand over frames without
    /// a copy. Only takes effect when the graphics side can import them.
    #[serde(alias = "zeroCopy")]
    pub zero_copy: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            element: "appsink".into(),
            name: "viewfinder-sink".into(),
            zero_copy: true,
        }
    }
}

/// Viewfinder settings, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewfinderConfig {
    pub sink: SinkConfig,
    /// Attach a GPU completion fence when handing frames back to the producer.
    #[serde(alias = "viewfinderUseFence", alias = "useFence")]
    pub use_fence: bool,
    /// RGBA clear colour painted behind (and around) the video.
    pub background: [f32; 4],
    #[serde(alias = "renderingEnabled")]
    pub rendering_enabled: bool,
    /// Clockwise picture rotation in degrees (0, 90, 180 or 270).
    #[serde(alias = "angle")]
    pub rotation: Rotation,
    /// Mirror the picture horizontally, as front cameras usually want.
    pub flipped: bool,
}

impl Default for ViewfinderConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            use_fence: true,
            background: [0.0, 0.0, 0.0, 1.0],
            rendering_enabled: true,
            rotation: Rotation::None,
            flipped: false,
        }
    }
}

impl ViewfinderConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ViewfinderError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ViewfinderError> {
        let path = path.as_ref();
        debug!("Loading viewfinder config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ViewfinderError> {
        if self.sink.element.trim().is_empty() {
            return Err(ViewfinderError::ConfigurationInvalid {
                reason: "sink element name is empty".into(),
            });
        }
        if self.background.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ViewfinderError::ConfigurationInvalid {
                reason: format!("background colour {:?} outside [0, 1]", self.background),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ViewfinderConfig;
    use crate::types::Rotation;

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "sink": {"viewfinderSink": "glimagesink"},
            "viewfinderUseFence": false,
            "renderingEnabled": false
        }"#;

        let cfg = ViewfinderConfig::from_json(json).expect("valid camelCase config");
        assert_eq!(cfg.sink.element, "glimagesink");
        assert_eq!(cfg.sink.name, "viewfinder-sink");
        assert!(!cfg.use_fence);
        assert!(!cfg.rendering_enabled);
    }

    #[test]
    fn deserializes_snake_case_fields() {
        let json = r#"{
            "use_fence": true,
            "background": [0.1, 0.1, 0.1, 1.0],
            "rendering_enabled": true
        }"#;

        let cfg = ViewfinderConfig::from_json(json).expect("valid snake_case config");
        assert!(cfg.use_fence);
        assert_eq!(cfg.background, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(cfg.sink.element, "appsink");
    }

    #[test]
    fn rejects_empty_element() {
        let json = r#"{"sink": {"element": "  "}}"#;
        assert!(ViewfinderConfig::from_json(json).is_err());
    }

    #[test]
    fn rejects_out_of_range_background() {
        let json = r#"{"background": [2.0, 0.0, 0.0, 1.0]}"#;
        assert!(ViewfinderConfig::from_json(json).is_err());
    }

    #[test]
    fn orientation_fields() {
        let cfg = ViewfinderConfig::from_json(r#"{"angle": 270, "flipped": true}"#).expect("valid orientation");
        assert_eq!(cfg.rotation, Rotation::Clockwise270);
        assert!(cfg.flipped);

        let defaults = ViewfinderConfig::default();
        assert_eq!(defaults.rotation, Rotation::None);
        assert!(!defaults.flipped);
        assert!(defaults.sink.zero_copy);
    }

    #[test]
    fn rejects_partial_turns() {
        assert!(ViewfinderConfig::from_json(r#"{"rotation": 45}"#).is_err());
    }

    #[test]
    fn zero_copy_can_be_disabled() {
        let cfg = ViewfinderConfig::from_json(r#"{"sink": {"zeroCopy": false}}"#).expect("valid");
        assert!(!cfg.sink.zero_copy);
    }
}
