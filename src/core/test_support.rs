// Scripted cameras, landmarkers and connections for unit tests

use crate::core::pose_detector::{DetectorSettings, PoseDetector};
use crate::core::stream_session::{ConnectionError, ConnectionResult, PoseConnection};
use crate::models::capture::{
    CameraSettings, CaptureError, CaptureResult, DeviceSelector, PixelFormat, RawFrame,
};
use crate::models::pose::{Landmark, LandmarkSet, PoseResult, POSE_LANDMARK_COUNT};
use crate::platform::camera::{CameraOpener, FrameSource};
use crate::platform::pose::{LandmarkerFactory, PoseLandmarker};
use async_trait::async_trait;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ==============================================================================
// Camera
// ==============================================================================

#[derive(Debug, Default)]
struct SourceCounters {
    reads: AtomicUsize,
    releases: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct CameraState(Arc<SourceCounters>);

impl CameraState {
    pub fn releases(&self) -> usize {
        self.0.releases.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.0.reads.load(Ordering::SeqCst)
    }
}

pub struct MockCamera {
    limit: Option<usize>,
    gate: Option<std_mpsc::Receiver<()>>,
    served: usize,
    released: bool,
    state: CameraState,
}

impl MockCamera {
    /// Camera that never runs out of frames
    pub fn endless() -> (Self, CameraState) {
        let state = CameraState::default();
        let camera = Self {
            limit: None,
            gate: None,
            served: 0,
            released: false,
            state: state.clone(),
        };
        (camera, state)
    }

    /// Camera with `count` frames. After the first frame, each further read
    /// waits for a signal on the returned sender.
    pub fn gated(count: usize) -> (Self, CameraState, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        let (mut camera, state) = Self::endless();
        camera.limit = Some(count);
        camera.gate = Some(rx);
        (camera, state, tx)
    }

    pub fn unavailable() -> UnavailableCamera {
        UnavailableCamera
    }
}

impl FrameSource for MockCamera {
    fn read(&mut self) -> CaptureResult<RawFrame> {
        self.state.0.reads.fetch_add(1, Ordering::SeqCst);

        if self.served > 0 {
            match &self.gate {
                Some(gate) => {
                    if gate.recv().is_err() {
                        return Err(CaptureError::StreamEnded);
                    }
                }
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        if let Some(limit) = self.limit {
            if self.served >= limit {
                return Err(CaptureError::StreamEnded);
            }
        }

        self.served += 1;
        Ok(RawFrame {
            timestamp: self.served as i64,
            width: 4,
            height: 4,
            data: vec![0; 4 * 4 * 3],
            format: PixelFormat::BGR8,
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.0.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn describe(&self) -> String {
        "mock camera".to_string()
    }
}

pub struct UnavailableCamera;

impl CameraOpener for UnavailableCamera {
    fn open(&self, device: &DeviceSelector, _settings: &CameraSettings) -> CaptureResult<Box<dyn FrameSource>> {
        Err(CaptureError::DeviceUnavailable(format!("{} not found", device)))
    }
}

// ==============================================================================
// Landmarker
// ==============================================================================

#[derive(Debug, Default)]
struct LandmarkerCounters {
    created: AtomicUsize,
    calls: AtomicUsize,
    releases: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct LandmarkerState(Arc<LandmarkerCounters>);

impl LandmarkerState {
    pub fn created(&self) -> usize {
        self.0.created.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.0.releases.load(Ordering::SeqCst)
    }
}

/// Landmarker that detects a body on the calls marked `true`, cycling the
/// pattern. Detections carry a second body that must be discarded.
#[derive(Clone)]
pub struct MockLandmarker {
    pattern: Vec<bool>,
    released: bool,
    state: LandmarkerState,
}

impl MockLandmarker {
    pub fn bodies(pattern: Vec<bool>) -> (Self, LandmarkerState) {
        let state = LandmarkerState::default();
        let landmarker = Self {
            pattern,
            released: false,
            state: state.clone(),
        };
        (landmarker, state)
    }

    pub fn factory(&self) -> MockLandmarkerFactory {
        MockLandmarkerFactory(self.clone())
    }
}

/// Full body with distinct, normalized coordinates per joint
pub fn primary_body() -> LandmarkSet {
    let points = (0..POSE_LANDMARK_COUNT)
        .map(|i| Landmark::new(i as f32 / POSE_LANDMARK_COUNT as f32, 0.25))
        .collect();
    LandmarkSet::new(points).unwrap()
}

fn secondary_body() -> LandmarkSet {
    LandmarkSet::new(vec![Landmark::new(0.9, 0.9); POSE_LANDMARK_COUNT]).unwrap()
}

impl PoseLandmarker for MockLandmarker {
    fn detect(&mut self, _image: &RgbImage) -> PoseResult<Vec<LandmarkSet>> {
        let call = self.state.0.calls.fetch_add(1, Ordering::SeqCst);
        let found = !self.pattern.is_empty() && self.pattern[call % self.pattern.len()];
        if found {
            Ok(vec![primary_body(), secondary_body()])
        } else {
            Ok(vec![])
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.0.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn model_info(&self) -> String {
        "mock landmarker".to_string()
    }
}

pub struct MockLandmarkerFactory(MockLandmarker);

impl LandmarkerFactory for MockLandmarkerFactory {
    fn create(&self) -> PoseResult<Box<dyn PoseLandmarker>> {
        self.0.state.0.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.0.clone()))
    }
}

/// Opener that hands out `camera` once
pub fn camera_opener(camera: MockCamera) -> impl CameraOpener {
    let slot = Mutex::new(Some(camera));
    move |_: &DeviceSelector, _: &CameraSettings| -> CaptureResult<Box<dyn FrameSource>> {
        match slot.lock().unwrap().take() {
            Some(camera) => Ok(Box::new(camera)),
            None => Err(CaptureError::DeviceUnavailable("camera already open".to_string())),
        }
    }
}

pub fn test_settings() -> DetectorSettings {
    DetectorSettings {
        device: DeviceSelector::Index(0),
        camera: CameraSettings::default(),
        debug_frame_dir: None,
    }
}

/// Start a detector that reads from `camera`
pub fn start_detector(camera: MockCamera, landmarker: MockLandmarker) -> PoseResult<PoseDetector> {
    PoseDetector::start(&camera_opener(camera), &landmarker.factory(), &test_settings())
}

// ==============================================================================
// Connection
// ==============================================================================

pub enum AckScript {
    /// Acknowledge every message at once
    Immediate,
    /// Acknowledge `n` messages, then report the peer gone
    FailAfter(usize),
    /// Acknowledge when the test sends on `ConnHandles::ack`
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnEvent {
    Sent(String),
    Ack,
    Closed,
}

pub struct MockConnection {
    script: AckScript,
    acks: usize,
    ack_rx: mpsc::UnboundedReceiver<()>,
    sent_tx: mpsc::UnboundedSender<String>,
    gate: Option<std_mpsc::Sender<()>>,
    events: Arc<Mutex<Vec<ConnEvent>>>,
    closed: Arc<AtomicBool>,
}

pub struct ConnHandles {
    pub sent: mpsc::UnboundedReceiver<String>,
    pub ack: mpsc::UnboundedSender<()>,
    events: Arc<Mutex<Vec<ConnEvent>>>,
    closed: Arc<AtomicBool>,
}

impl ConnHandles {
    pub fn events(&self) -> Vec<ConnEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ConnEvent::Sent(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MockConnection {
    pub fn new(script: AckScript) -> (Self, ConnHandles) {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let events = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let connection = Self {
            script,
            acks: 0,
            ack_rx,
            sent_tx,
            gate: None,
            events: events.clone(),
            closed: closed.clone(),
        };
        let handles = ConnHandles {
            sent: sent_rx,
            ack: ack_tx,
            events,
            closed,
        };
        (connection, handles)
    }

    /// Release the next camera frame whenever a message is sent
    pub fn gated_by(mut self, gate: std_mpsc::Sender<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn record(&self, event: ConnEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl PoseConnection for MockConnection {
    async fn send_text(&mut self, text: String) -> ConnectionResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        self.record(ConnEvent::Sent(text.clone()));
        let _ = self.sent_tx.send(text);
        if let Some(gate) = &self.gate {
            let _ = gate.send(());
        }
        Ok(())
    }

    async fn receive(&mut self) -> ConnectionResult<()> {
        let acked = match self.script {
            AckScript::Immediate => true,
            AckScript::FailAfter(limit) => self.acks < limit,
            AckScript::Manual => self.ack_rx.recv().await.is_some(),
        };
        if !acked {
            return Err(ConnectionError::Closed);
        }
        self.acks += 1;
        self.record(ConnEvent::Ack);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.record(ConnEvent::Closed);
        }
    }
}
