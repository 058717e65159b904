// WebSocket front end: one stream session per connected client

use crate::core::config::Config;
use crate::core::pose_detector::{DetectorSettings, PoseDetector};
use crate::core::stream_session::{
    ConnectionError, ConnectionResult, PoseConnection, SessionSummary, StreamSession,
};
use crate::models::pose::{PoseError, PoseResult};
use crate::platform::camera::CameraOpener;
use crate::platform::pose::LandmarkerFactory;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

pub const POSE_ENDPOINT: &str = "/ws/pose";
pub const HEALTH_ENDPOINT: &str = "/health";

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub active_sessions: usize,
}

// ==============================================================================
// Server
// ==============================================================================

/// Accepts pose clients and gives each its own capture loop.
///
/// The camera and model backends are injected so the same server runs
/// against real hardware or scripted sources.
pub struct PoseServer {
    config: Config,
    camera: Arc<dyn CameraOpener>,
    landmarker: Arc<dyn LandmarkerFactory>,
    active_sessions: AtomicUsize,
}

impl PoseServer {
    pub fn new(
        config: Config,
        camera: Arc<dyn CameraOpener>,
        landmarker: Arc<dyn LandmarkerFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            camera,
            landmarker,
            active_sessions: AtomicUsize::new(0),
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            active_sessions: self.active_sessions(),
        }
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(POSE_ENDPOINT, get(pose_socket_handler))
            .route(HEALTH_ENDPOINT, get(health_handler))
            .with_state(self.clone())
    }

    /// Open the camera and model for a new session.
    ///
    /// Device and model setup block, so they run off the async workers.
    pub async fn open_detector(&self) -> PoseResult<PoseDetector> {
        let camera = self.camera.clone();
        let landmarker = self.landmarker.clone();
        let settings = DetectorSettings::from_config(&self.config);

        tokio::task::spawn_blocking(move || {
            PoseDetector::start(camera.as_ref(), landmarker.as_ref(), &settings)
        })
        .await
        .map_err(|e| PoseError::WorkerSpawn(e.to_string()))?
    }

    /// Serve one client until it leaves or capture ends
    pub async fn run_session<C: PoseConnection>(&self, connection: C) -> SessionSummary {
        let _active = ActiveSession::enter(&self.active_sessions);

        let detector = self.open_detector().await;
        let mut session = StreamSession::new(connection, detector, self.config.flow_control);
        tracing::info!(session_id = %session.id(), "Client connected");
        session.run().await
    }

    /// Bind `bind_addr` and serve until Ctrl-C
    pub async fn serve(self: Arc<Self>) -> Result<(), ServerError> {
        let addr = self.config.bind_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    pub async fn serve_with_shutdown<F>(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            endpoint = POSE_ENDPOINT,
            flow_control = ?self.config.flow_control,
            "Pose stream server listening"
        );

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Pose stream server stopped");
        Ok(())
    }
}

struct ActiveSession<'a>(&'a AtomicUsize);

impl<'a> ActiveSession<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown requested");
}

// ==============================================================================
// Handlers
// ==============================================================================

async fn pose_socket_handler(
    ws: WebSocketUpgrade,
    State(server): State<Arc<PoseServer>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        server.run_session(WsConnection::new(socket)).await;
    })
}

async fn health_handler(State(server): State<Arc<PoseServer>>) -> Json<HealthStatus> {
    Json(server.health())
}

// ==============================================================================
// WebSocket connection
// ==============================================================================

pub struct WsConnection {
    socket: WebSocket,
    closed: bool,
}

impl WsConnection {
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

#[async_trait]
impl PoseConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> ConnectionResult<()> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn receive(&mut self) -> ConnectionResult<()> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => return Ok(()),
                // Control frames are not client messages
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Err(ConnectionError::Closed);
                }
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = SinkExt::close(&mut self.socket).await {
            tracing::trace!(error = %e, "WebSocket close failed");
        }
    }
}
