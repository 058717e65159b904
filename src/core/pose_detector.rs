use crate::core::config::Config;
use crate::core::overlay::render_overlay;
use crate::core::transfer_channel::{FrameSlot, Publish};
use crate::models::capture::{CameraSettings, CaptureError, DeviceSelector};
use crate::models::pose::{PoseError, PoseFrame, PoseResult};
use crate::platform::camera::{CameraOpener, FrameSource};
use crate::platform::pose::{LandmarkerFactory, PoseLandmarker};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pause after a failed frame read before retrying
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);
/// How long `stop` waits for the capture thread before letting it finish alone
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

// ==============================================================================
// Settings & Statistics
// ==============================================================================

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub device: DeviceSelector,
    pub camera: CameraSettings,
    pub debug_frame_dir: Option<PathBuf>,
}

impl DetectorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device: config.device_selector(),
            camera: config.camera_settings(),
            debug_frame_dir: config.debug_frame_dir.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct LoopCounters {
    frames_captured: AtomicU64,
    frames_published: AtomicU64,
    frames_dropped: AtomicU64,
    frames_with_body: AtomicU64,
    read_failures: AtomicU64,
    inference_failures: AtomicU64,
}

/// Snapshot of capture loop activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub frames_captured: u64,
    pub frames_published: u64,
    pub frames_dropped: u64, // Overwritten in the slot before the session took them
    pub frames_with_body: u64,
    pub read_failures: u64,
    pub inference_failures: u64,
}

impl LoopCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LoopStats {
        LoopStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_with_body: self.frames_with_body.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
        }
    }
}

// ==============================================================================
// Pose Detector
// ==============================================================================

/// Capture-inference loop running on its own OS thread.
///
/// Owns the camera and the landmarker for one session. Frames are published
/// into a latest-wins `FrameSlot`; the loop is never paced by the consumer.
pub struct PoseDetector {
    frames: FrameSlot<PoseFrame>,
    cancel: Arc<AtomicBool>,
    counters: Arc<LoopCounters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PoseDetector {
    /// Open the camera, create the landmarker and start the capture thread.
    ///
    /// Failing to open the camera or load the model is fatal: nothing is
    /// started and anything already acquired is released.
    pub fn start(
        camera: &dyn CameraOpener,
        landmarker: &dyn LandmarkerFactory,
        settings: &DetectorSettings,
    ) -> PoseResult<Self> {
        let mut source = camera
            .open(&settings.device, &settings.camera)
            .map_err(|e| PoseError::DeviceUnavailable(e.to_string()))?;

        let landmarker = match landmarker.create() {
            Ok(landmarker) => landmarker,
            Err(e) => {
                source.release();
                return Err(e);
            }
        };

        tracing::info!(
            source = %source.describe(),
            model = %landmarker.model_info(),
            "Starting capture loop"
        );

        let debug_frame_dir = settings
            .debug_frame_dir
            .as_deref()
            .and_then(prepare_debug_dir);

        let frames = FrameSlot::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(LoopCounters::default());

        let capture_loop = CaptureLoop {
            source,
            landmarker,
            frames: frames.clone(),
            cancel: cancel.clone(),
            counters: counters.clone(),
            debug_frame_dir,
            sequence: 0,
        };

        let worker = thread::Builder::new()
            .name("pose-capture".to_string())
            .spawn(move || capture_loop.run())
            .map_err(|e| PoseError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            frames,
            cancel,
            counters,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Wait for the next pose frame. `None` once the loop has ended.
    pub async fn next_frame(&self) -> Option<PoseFrame> {
        self.frames.take().await
    }

    pub fn stats(&self) -> LoopStats {
        self.counters.snapshot()
    }

    /// Stop the capture loop and wait for the camera to be released.
    ///
    /// Safe to call more than once. If the thread is stuck inside the camera
    /// or the model it is left to finish on its own; it exits before
    /// publishing again.
    pub async fn stop(&self) -> LoopStats {
        self.stop_within(JOIN_TIMEOUT).await
    }

    /// `stop` with an explicit limit on the wait for the capture thread
    pub async fn stop_within(&self, timeout: Duration) -> LoopStats {
        self.cancel.store(true, Ordering::Release);
        self.frames.close();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = worker {
            let join = tokio::task::spawn_blocking(move || handle.join());
            match tokio::time::timeout(timeout, join).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(_))) => tracing::error!("Capture thread panicked"),
                Ok(Err(e)) => tracing::error!(error = %e, "Failed to join capture thread"),
                Err(_) => tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Capture thread did not stop in time; leaving it to exit on its own"
                ),
            }

            let stats = self.stats();
            tracing::info!(
                frames_captured = stats.frames_captured,
                frames_published = stats.frames_published,
                frames_dropped = stats.frames_dropped,
                frames_with_body = stats.frames_with_body,
                read_failures = stats.read_failures,
                "Capture loop stopped"
            );
        }

        self.stats()
    }
}

impl Drop for PoseDetector {
    fn drop(&mut self) {
        // The thread notices on its next iteration and releases the camera
        self.cancel.store(true, Ordering::Release);
        self.frames.close();
    }
}

// ==============================================================================
// Capture Loop (runs on the capture thread)
// ==============================================================================

struct CaptureLoop {
    source: Box<dyn FrameSource>,
    landmarker: Box<dyn PoseLandmarker>,
    frames: FrameSlot<PoseFrame>,
    cancel: Arc<AtomicBool>,
    counters: Arc<LoopCounters>,
    debug_frame_dir: Option<PathBuf>,
    sequence: u64,
}

impl CaptureLoop {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn run(mut self) {
        while !self.cancelled() {
            let raw = match self.source.read() {
                Ok(raw) => raw,
                Err(CaptureError::StreamEnded) => {
                    tracing::warn!("Camera stream ended");
                    break;
                }
                Err(e) => {
                    LoopCounters::bump(&self.counters.read_failures);
                    tracing::debug!(error = %e, "Failed to read frame from camera");
                    thread::sleep(READ_RETRY_DELAY);
                    continue;
                }
            };
            LoopCounters::bump(&self.counters.frames_captured);

            let image = match raw.to_rgb_image() {
                Ok(image) => image,
                Err(e) => {
                    LoopCounters::bump(&self.counters.read_failures);
                    tracing::debug!(error = %e, "Skipping malformed frame");
                    continue;
                }
            };

            let landmarks = match self.landmarker.detect(&image) {
                // Single-subject: only the primary body is kept
                Ok(bodies) => bodies.into_iter().next().unwrap_or_default(),
                Err(e) => {
                    LoopCounters::bump(&self.counters.inference_failures);
                    tracing::warn!(error = %e, "Pose inference failed");
                    continue;
                }
            };

            self.sequence += 1;
            let frame = PoseFrame::new(self.sequence, raw.timestamp, landmarks);
            if frame.has_body() {
                LoopCounters::bump(&self.counters.frames_with_body);
            }

            if let Some(dir) = &self.debug_frame_dir {
                if let Err(e) = write_debug_frame(dir, &frame, &image) {
                    tracing::warn!(error = %e, "Failed to write debug frame");
                }
            }

            if self.cancelled() {
                break;
            }

            match self.frames.publish(frame) {
                Publish::Stored => {
                    LoopCounters::bump(&self.counters.frames_published);
                }
                Publish::Replaced => {
                    LoopCounters::bump(&self.counters.frames_published);
                    LoopCounters::bump(&self.counters.frames_dropped);
                }
                Publish::Closed => break,
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        // Runs once, on normal exit or unwind
        self.source.release();
        self.landmarker.release();
        self.frames.close();
    }
}

// ==============================================================================
// Diagnostics
// ==============================================================================

fn prepare_debug_dir(dir: &Path) -> Option<PathBuf> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => {
            tracing::info!(dir = %dir.display(), "Writing annotated debug frames");
            Some(dir.to_path_buf())
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Debug frame directory unusable; hook disabled");
            None
        }
    }
}

fn write_debug_frame(dir: &Path, frame: &PoseFrame, image: &RgbImage) -> image::ImageResult<PathBuf> {
    let annotated = render_overlay(image, &frame.landmarks);
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%f");
    let path = dir.join(format!("debug_frame_{}_{:06}.jpg", stamp, frame.sequence));
    annotated.save(&path)?;
    Ok(path)
}
