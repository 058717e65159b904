// Camera integration
// Frame sources are opened per session and released when the session ends

pub mod ffmpeg;

pub use ffmpeg::{FfmpegCamera, FfmpegCameraOpener};

use crate::models::capture::{CameraSettings, CaptureResult, DeviceSelector, RawFrame};

/// An opened camera handle
pub trait FrameSource: Send {
    /// Read the next frame. `ReadFailed` is transient; `StreamEnded` means
    /// the device is gone and no further frames will arrive.
    fn read(&mut self) -> CaptureResult<RawFrame>;

    /// Release the device. Safe to call more than once.
    fn release(&mut self);

    /// Get a description of the opened device
    fn describe(&self) -> String;
}

/// Opens frame sources from a configured device selector
pub trait CameraOpener: Send + Sync {
    fn open(
        &self,
        device: &DeviceSelector,
        settings: &CameraSettings,
    ) -> CaptureResult<Box<dyn FrameSource>>;
}

impl<F> CameraOpener for F
where
    F: Fn(&DeviceSelector, &CameraSettings) -> CaptureResult<Box<dyn FrameSource>> + Send + Sync,
{
    fn open(
        &self,
        device: &DeviceSelector,
        settings: &CameraSettings,
    ) -> CaptureResult<Box<dyn FrameSource>> {
        self(device, settings)
    }
}
