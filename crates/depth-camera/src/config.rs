use crate::mode::ModeId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which driver backs the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DriverConfig {
    /// Test-pattern devices, no hardware required
    Synthetic {
        #[serde(default = "default_synthetic_devices")]
        devices: usize,
    },
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig::Synthetic {
            devices: default_synthetic_devices(),
        }
    }
}

fn default_synthetic_devices() -> usize {
    1
}

/// Root configuration of the depth camera node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Camera name (used in topic names)
    #[serde(default = "default_name")]
    pub name: String,
    /// Device to open: empty for the first one, `bus@address`, a serial
    /// number, or an index
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub driver: DriverConfig,
    /// Color output mode requested at startup
    #[serde(default = "default_mode")]
    pub image_mode: ModeId,
    /// Depth output mode requested at startup
    #[serde(default = "default_mode")]
    pub depth_mode: ModeId,
    #[serde(default = "default_rgb_frame_id")]
    pub rgb_frame_id: String,
    #[serde(default = "default_depth_frame_id")]
    pub depth_frame_id: String,
    /// Also publish a grayscale copy of the color image
    #[serde(default)]
    pub publish_mono: bool,
    /// Start the depth stream and publish depth images
    #[serde(default = "default_true")]
    pub publish_depth: bool,
    /// Upper bound on a single device mode switch
    #[serde(default = "default_mode_switch_timeout_ms")]
    pub mode_switch_timeout_ms: u64,
}

fn default_name() -> String {
    "openni".to_string()
}

fn default_mode() -> ModeId {
    ModeId::Vga30Hz
}

fn default_rgb_frame_id() -> String {
    "openni_rgb_optical_frame".to_string()
}

fn default_depth_frame_id() -> String {
    "openni_depth_optical_frame".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mode_switch_timeout_ms() -> u64 {
    2000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            device_id: String::new(),
            driver: DriverConfig::default(),
            image_mode: default_mode(),
            depth_mode: default_mode(),
            rgb_frame_id: default_rgb_frame_id(),
            depth_frame_id: default_depth_frame_id(),
            publish_mono: false,
            publish_depth: default_true(),
            mode_switch_timeout_ms: default_mode_switch_timeout_ms(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name.len() > 64 {
            return Err(ConfigError::ValidationError(format!(
                "Camera name must be 1-64 characters, got {}",
                self.name.len()
            )));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::ValidationError(
                "Camera name may only contain alphanumeric characters, hyphens, and underscores"
                    .to_string(),
            ));
        }
        if self.rgb_frame_id.is_empty() || self.depth_frame_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "Frame ids must not be empty".to_string(),
            ));
        }
        if self.mode_switch_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "mode_switch_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mode_switch_timeout(&self) -> Duration {
        Duration::from_millis(self.mode_switch_timeout_ms)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = NodeConfig::parse("{}").unwrap();
        assert_eq!(config.name, "openni");
        assert_eq!(config.device_id, "");
        assert_eq!(config.image_mode, ModeId::Vga30Hz);
        assert_eq!(config.depth_mode, ModeId::Vga30Hz);
        assert_eq!(config.rgb_frame_id, "openni_rgb_optical_frame");
        assert_eq!(config.depth_frame_id, "openni_depth_optical_frame");
        assert!(!config.publish_mono);
        assert!(config.publish_depth);
        assert_eq!(config.mode_switch_timeout(), Duration::from_secs(2));
        assert_eq!(config.driver, DriverConfig::Synthetic { devices: 1 });
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
name: "kinect_front"
device_id: "1@3"
driver:
  kind: synthetic
  devices: 2
image_mode: sxga_15hz
depth_mode: qvga_30hz
rgb_frame_id: front_rgb
depth_frame_id: front_depth
publish_mono: true
publish_depth: false
mode_switch_timeout_ms: 500
"#;
        let config = NodeConfig::parse(yaml).unwrap();
        assert_eq!(config.name, "kinect_front");
        assert_eq!(config.device_id, "1@3");
        assert_eq!(config.driver, DriverConfig::Synthetic { devices: 2 });
        assert_eq!(config.image_mode, ModeId::Sxga15Hz);
        assert_eq!(config.depth_mode, ModeId::Qvga30Hz);
        assert!(config.publish_mono);
        assert!(!config.publish_depth);
        assert_eq!(config.mode_switch_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_mode_name_is_parse_error() {
        let result = NodeConfig::parse("image_mode: uxga_60hz\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            NodeConfig::parse("name: \"front camera\"\n"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            NodeConfig::parse("mode_switch_timeout_ms: 0\n"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            NodeConfig::parse("rgb_frame_id: \"\"\n"),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "name: cam0\ndepth_mode: qqvga_30hz\n").unwrap();
        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.name, "cam0");
        assert_eq!(config.depth_mode, ModeId::Qqvga30Hz);
    }

    #[test]
    fn test_from_file_nonexistent() {
        let result = NodeConfig::from_file("/nonexistent/path.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
