// MediaPipe integration bridge
// Abstraction over the body pose landmarker. The model itself is supplied by
// the deployment; this crate only consumes its output.

use crate::models::pose::{LandmarkSet, PoseResult};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Body pose landmarker
///
/// Created once per session and called synchronously from the capture thread.
pub trait PoseLandmarker: Send {
    /// Run inference on one RGB frame.
    ///
    /// Returns one `LandmarkSet` per detected body, primary body first. An
    /// empty vector means no body was found.
    fn detect(&mut self, image: &RgbImage) -> PoseResult<Vec<LandmarkSet>>;

    /// Release model resources. Safe to call more than once.
    fn release(&mut self) {}

    /// Get model info
    fn model_info(&self) -> String;
}

/// Creates a landmarker for each new session
pub trait LandmarkerFactory: Send + Sync {
    fn create(&self) -> PoseResult<Box<dyn PoseLandmarker>>;
}

impl<F> LandmarkerFactory for F
where
    F: Fn() -> PoseResult<Box<dyn PoseLandmarker>> + Send + Sync,
{
    fn create(&self) -> PoseResult<Box<dyn PoseLandmarker>> {
        self()
    }
}

// ==============================================================================
// Dummy Implementation (no inference backend linked)
// ==============================================================================

pub struct DummyLandmarker {
    model_path: PathBuf,
}

impl DummyLandmarker {
    pub fn new(model_path: &Path) -> Self {
        tracing::warn!(
            model_path = %model_path.display(),
            "Using dummy pose landmarker (no inference); every frame reports no body"
        );
        Self {
            model_path: model_path.to_path_buf(),
        }
    }
}

impl PoseLandmarker for DummyLandmarker {
    fn detect(&mut self, _image: &RgbImage) -> PoseResult<Vec<LandmarkSet>> {
        Ok(vec![])
    }

    fn model_info(&self) -> String {
        format!("Dummy landmarker (no inference) for {}", self.model_path.display())
    }
}

/// Factory for `DummyLandmarker`
#[derive(Debug, Clone)]
pub struct DummyLandmarkerFactory {
    model_path: PathBuf,
}

impl DummyLandmarkerFactory {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }
}

impl LandmarkerFactory for DummyLandmarkerFactory {
    fn create(&self) -> PoseResult<Box<dyn PoseLandmarker>> {
        Ok(Box::new(DummyLandmarker::new(&self.model_path)))
    }
}

// ==============================================================================
// Default Backend Selection
// ==============================================================================

pub type DefaultLandmarkerFactory = DummyLandmarkerFactory;
