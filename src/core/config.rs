use crate::core::stream_session::FlowControl;
use crate::models::capture::{CameraSettings, DeviceSelector};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "POSE_STREAM_CONFIG";
/// Environment variable overriding `bind_addr`
pub const BIND_ADDR_ENV: &str = "POSE_STREAM_BIND";

const DEFAULT_CONFIG_FILE: &str = "pose_stream.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Address the WebSocket server listens on
    pub bind_addr: String,
    /// Camera selector: an index ("0") or a device path ("/dev/video0")
    pub device: String,
    /// Requested capture width in pixels
    pub frame_width: u32,
    /// Requested capture height in pixels
    pub frame_height: u32,
    /// Requested capture rate
    pub camera_fps: u32,
    /// Whether each message waits for a client acknowledgment
    pub flow_control: FlowControl,
    /// Pose landmarker model file. Passed to the landmarker factory; the
    /// bundled dummy backend only reports it and runs no inference.
    pub model_path: PathBuf,
    /// When set, annotated frames are written here as JPEG (diagnostics only)
    pub debug_frame_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            device: "0".to_string(),
            frame_width: 640,
            frame_height: 480,
            camera_fps: 30,
            flow_control: FlowControl::Acknowledged,
            model_path: PathBuf::from("shared/models/pose_landmarker_lite.task"),
            debug_frame_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from `$POSE_STREAM_CONFIG` (or `pose_stream.json`),
    /// falling back to defaults when the file does not exist, then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = Self::load_from(&path)?;
        if let Ok(bind_addr) = std::env::var(BIND_ADDR_ENV) {
            config.bind_addr = bind_addr;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "Invalid bind address: {}. Expected host:port",
                self.bind_addr
            )));
        }

        if self.device.trim().is_empty() {
            return Err(ConfigError::Invalid("Camera device cannot be empty".to_string()));
        }

        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Invalid frame size: {}x{}",
                self.frame_width, self.frame_height
            )));
        }

        if self.camera_fps == 0 || self.camera_fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "Invalid camera FPS: {}. Must be between 1 and 120",
                self.camera_fps
            )));
        }

        Ok(())
    }

    pub fn device_selector(&self) -> DeviceSelector {
        DeviceSelector::parse(self.device.trim())
    }

    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            width: self.frame_width,
            height: self.frame_height,
            fps: self.camera_fps,
        }
    }
}
