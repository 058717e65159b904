// Data structures for camera capture

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A raw frame read from the camera
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub timestamp: i64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub format: PixelFormat,
}

/// Pixel format of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    BGR8,
    RGB8,
}

impl RawFrame {
    /// Convert to the RGB layout the landmarker expects.
    /// Channel reorder only; no resize and no lossy step.
    pub fn to_rgb_image(&self) -> CaptureResult<RgbImage> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(CaptureError::InvalidFrame(format!(
                "{}x{} frame carries {} bytes, expected {}",
                self.width,
                self.height,
                self.data.len(),
                expected
            )));
        }

        let data = match self.format {
            PixelFormat::RGB8 => self.data.clone(),
            PixelFormat::BGR8 => {
                let mut rgb = Vec::with_capacity(self.data.len());
                for px in self.data.chunks_exact(3) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                rgb
            }
        };

        RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| CaptureError::InvalidFrame("buffer does not fit frame size".to_string()))
    }
}

/// Identifies which camera to open. Fixed by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSelector {
    Index(u32),
    Path(String),
}

impl DeviceSelector {
    /// Parse `"0"` or `"/dev/video0"` style selectors
    pub fn parse(selector: &str) -> Self {
        if let Ok(index) = selector.parse::<u32>() {
            return DeviceSelector::Index(index);
        }
        if let Some(stripped) = selector.strip_prefix("/dev/video") {
            if let Ok(index) = stripped.parse::<u32>() {
                return DeviceSelector::Index(index);
            }
        }
        DeviceSelector::Path(selector.to_string())
    }

    pub fn device_path(&self) -> String {
        match self {
            DeviceSelector::Index(index) => format!("/dev/video{}", index),
            DeviceSelector::Path(path) => path.clone(),
        }
    }
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSelector::Index(index) => write!(f, "camera #{}", index),
            DeviceSelector::Path(path) => write!(f, "{}", path),
        }
    }
}

/// Requested capture geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Error types for camera capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Capture stream ended")]
    StreamEnded,

    #[error("Not supported on this platform")]
    NotSupported,
}

pub type CaptureResult<T> = Result<T, CaptureError>;
