//! Camera capture through an `ffmpeg` child process
//!
//! ffmpeg opens the platform capture device and writes raw `bgr24` frames to
//! stdout, one fixed-size buffer per frame. No native capture library is
//! linked.

use crate::models::capture::{
    CameraSettings, CaptureError, CaptureResult, DeviceSelector, PixelFormat, RawFrame,
};
use crate::platform::camera::{CameraOpener, FrameSource};
use chrono::Utc;
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

#[cfg(target_os = "linux")]
const INPUT_FORMAT: &str = "video4linux2";
#[cfg(target_os = "macos")]
const INPUT_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const INPUT_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const INPUT_FORMAT: &str = "video4linux2";

/// Opens `FfmpegCamera` handles
#[derive(Debug, Clone, Default)]
pub struct FfmpegCameraOpener {
    ffmpeg_binary: Option<String>,
}

impl FfmpegCameraOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific ffmpeg executable instead of the one on `PATH`
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            ffmpeg_binary: Some(binary.into()),
        }
    }
}

impl CameraOpener for FfmpegCameraOpener {
    fn open(
        &self,
        device: &DeviceSelector,
        settings: &CameraSettings,
    ) -> CaptureResult<Box<dyn FrameSource>> {
        let binary = self.ffmpeg_binary.as_deref().unwrap_or("ffmpeg");
        let camera = FfmpegCamera::open(binary, device, settings)?;
        Ok(Box::new(camera))
    }
}

pub struct FfmpegCamera {
    device: DeviceSelector,
    settings: CameraSettings,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    pending: Option<RawFrame>,
    buffer: Vec<u8>,
}

impl FfmpegCamera {
    /// Spawn ffmpeg for the device and read one probe frame.
    ///
    /// ffmpeg exits right away when it cannot open the device, so a missing
    /// probe frame is reported as `DeviceUnavailable`.
    pub fn open(
        binary: &str,
        device: &DeviceSelector,
        settings: &CameraSettings,
    ) -> CaptureResult<Self> {
        let input = input_name(device)?;

        #[cfg(target_os = "linux")]
        {
            if !std::path::Path::new(&input).exists() {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "{} does not exist",
                    input
                )));
            }
        }

        let mut cmd = Command::new(binary);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg(INPUT_FORMAT)
            .arg("-framerate")
            .arg(settings.fps.to_string())
            .arg("-video_size")
            .arg(format!("{}x{}", settings.width, settings.height))
            .arg("-i")
            .arg(&input)
            // The driver may pick another mode; frames are read at a fixed size
            .arg("-vf")
            .arg(format!("scale={}:{}", settings.width, settings.height))
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|err| {
            CaptureError::DeviceUnavailable(format!("failed to start {}: {}", binary, err))
        })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::DeviceUnavailable(
                    "failed to capture ffmpeg stdout".to_string(),
                ));
            }
        };

        let frame_bytes = settings.width as usize * settings.height as usize * 3;
        let mut camera = Self {
            device: device.clone(),
            settings: *settings,
            child: Some(child),
            stdout: Some(stdout),
            pending: None,
            buffer: vec![0u8; frame_bytes],
        };

        match camera.read_frame() {
            Ok(frame) => {
                camera.pending = Some(frame);
                Ok(camera)
            }
            Err(err) => {
                camera.release();
                Err(CaptureError::DeviceUnavailable(format!(
                    "{} produced no frames: {}",
                    device, err
                )))
            }
        }
    }

    fn read_frame(&mut self) -> CaptureResult<RawFrame> {
        let stdout = self.stdout.as_mut().ok_or(CaptureError::StreamEnded)?;

        match stdout.read_exact(&mut self.buffer) {
            Ok(()) => Ok(RawFrame {
                timestamp: Utc::now().timestamp_millis(),
                width: self.settings.width,
                height: self.settings.height,
                data: self.buffer.clone(),
                format: PixelFormat::BGR8,
            }),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(CaptureError::StreamEnded),
            Err(err) => {
                let exited = self
                    .child
                    .as_mut()
                    .map(|child| matches!(child.try_wait(), Ok(Some(_))))
                    .unwrap_or(true);
                if exited {
                    Err(CaptureError::StreamEnded)
                } else {
                    Err(CaptureError::ReadFailed(err.to_string()))
                }
            }
        }
    }
}

impl FrameSource for FfmpegCamera {
    fn read(&mut self) -> CaptureResult<RawFrame> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        self.read_frame()
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(device = %self.device, "Camera released");
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} via ffmpeg ({}x{} @ {} fps)",
            self.device, self.settings.width, self.settings.height, self.settings.fps
        )
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Map a device selector to the ffmpeg input name for this platform
fn input_name(device: &DeviceSelector) -> CaptureResult<String> {
    #[cfg(target_os = "linux")]
    {
        Ok(device.device_path())
    }

    #[cfg(target_os = "macos")]
    {
        match device {
            DeviceSelector::Index(index) => Ok(index.to_string()),
            DeviceSelector::Path(name) => Ok(name.clone()),
        }
    }

    #[cfg(target_os = "windows")]
    {
        match device {
            DeviceSelector::Path(name) => Ok(format!("video={}", name)),
            DeviceSelector::Index(_) => Err(CaptureError::DeviceUnavailable(
                "dshow capture needs a device name, not an index".to_string(),
            )),
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = device;
        Err(CaptureError::NotSupported)
    }
}
