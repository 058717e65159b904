// Data models for body pose landmarks and the wire messages built from them

use serde::{Deserialize, Serialize};

// ==============================================================================
// Constants
// ==============================================================================

/// Number of landmarks produced by the lite body pose model
pub const POSE_LANDMARK_COUNT: usize = 33;

/// Bones drawn between landmark pairs. Every index is below `POSE_LANDMARK_COUNT`.
pub const SKELETON_GRAPH: [(usize, usize); 19] = [
    (0, 11),
    (0, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
    (15, 17),
    (16, 18),
    (17, 19),
    (18, 20),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (11, 23),
    (12, 24),
];

// ==============================================================================
// Landmark
// ==============================================================================

/// A single body keypoint, normalized to the frame size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32, // Normalized [0, 1] relative to frame width
    pub y: f32, // Normalized [0, 1] relative to frame height
    #[serde(default)]
    pub z: f32, // Depth relative to the hip midpoint (unused on the wire)
    #[serde(default)]
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility: 1.0,
        }
    }

    pub fn with_depth(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    /// Pixel position of this landmark in a frame of the given size.
    /// Rendering-time only; the stored coordinates stay normalized.
    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// MediaPipe Pose Landmark indices (33 total)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BodyLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyLandmark {
    pub fn index(self) -> usize {
        self as usize
    }
}

// ==============================================================================
// Landmark Set
// ==============================================================================

/// Landmarks of one detected body, indexed by joint.
///
/// Either empty (no body) or exactly `POSE_LANDMARK_COUNT` long. Partial sets
/// cannot be constructed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet(Vec<Landmark>);

impl LandmarkSet {
    pub fn new(landmarks: Vec<Landmark>) -> PoseResult<Self> {
        if !landmarks.is_empty() && landmarks.len() != POSE_LANDMARK_COUNT {
            return Err(PoseError::InvalidLandmarkSet {
                expected: POSE_LANDMARK_COUNT,
                actual: landmarks.len(),
            });
        }
        Ok(Self(landmarks))
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.0.get(index)
    }

    pub fn joint(&self, landmark: BodyLandmark) -> Option<&Landmark> {
        self.get(landmark.index())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Landmark> {
        self.0.iter()
    }
}

// ==============================================================================
// Pose Frame
// ==============================================================================

/// One unit of capture loop output
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    pub sequence: u64,  // Strictly increasing within one capture loop
    pub timestamp: i64, // Capture time, unix millis
    pub landmarks: LandmarkSet,
}

impl PoseFrame {
    pub fn new(sequence: u64, timestamp: i64, landmarks: LandmarkSet) -> Self {
        Self {
            sequence,
            timestamp,
            landmarks,
        }
    }

    pub fn has_body(&self) -> bool {
        !self.landmarks.is_empty()
    }
}

// ==============================================================================
// Wire Messages
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    pub x: f32,
    pub y: f32,
}

/// Server -> client text message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoseMessage {
    Landmarks { landmarks: Vec<WirePoint> },
    Error { error: String },
}

impl PoseMessage {
    pub fn from_frame(frame: &PoseFrame) -> Self {
        let landmarks = frame
            .landmarks
            .iter()
            .map(|lm| WirePoint { x: lm.x, y: lm.y })
            .collect();
        PoseMessage::Landmarks { landmarks }
    }

    pub fn error(message: impl Into<String>) -> Self {
        PoseMessage::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> PoseResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Could not open webcam: {0}")]
    DeviceUnavailable(String),

    #[error("Model loading failed: {0}")]
    ModelLoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid landmark set: expected {expected} landmarks, got {actual}")]
    InvalidLandmarkSet { expected: usize, actual: usize },

    #[error("Failed to start capture worker: {0}")]
    WorkerSpawn(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PoseResult<T> = Result<T, PoseError>;
