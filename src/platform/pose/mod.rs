// Pose estimation platform integration
// Provides the landmarker bridge and its default backend

pub mod mediapipe_bridge;

pub use mediapipe_bridge::{
    DefaultLandmarkerFactory, DummyLandmarker, DummyLandmarkerFactory, LandmarkerFactory,
    PoseLandmarker,
};
