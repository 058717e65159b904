// Per-connection consumer: takes pose frames, sends them, waits for the client

use crate::core::pose_detector::{LoopStats, PoseDetector};
use crate::models::pose::{PoseError, PoseMessage, PoseResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// Connection
// ==============================================================================

/// How the session paces transmission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    /// Send one message, then wait for any client message before the next
    #[default]
    Acknowledged,
    /// Send every frame as it is taken, best effort
    Continuous,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed by peer")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// One bidirectional client connection
#[async_trait]
pub trait PoseConnection: Send {
    /// Send one text message
    async fn send_text(&mut self, text: String) -> ConnectionResult<()>;

    /// Wait for the next client message. Its content is not interpreted.
    async fn receive(&mut self) -> ConnectionResult<()>;

    /// Close the connection (best effort)
    async fn close(&mut self);
}

// ==============================================================================
// Session
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    /// The client closed the connection or stopped acknowledging
    ClientDisconnected,
    /// Sending to the client failed
    SendFailed,
    /// The capture loop stopped producing frames
    CaptureEnded,
    /// The camera or model could not be started
    StartupFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub messages_sent: u64,
    pub acks_received: u64,
    pub end: SessionEnd,
    pub capture: LoopStats,
}

/// Streams pose frames to one client.
///
/// Owns the session's capture loop; the camera is released before `run`
/// returns, whatever ended the session.
pub struct StreamSession<C> {
    id: Uuid,
    connection: C,
    detector: Option<PoseDetector>,
    startup_error: Option<PoseError>,
    flow_control: FlowControl,
    messages_sent: u64,
    acks_received: u64,
    final_stats: LoopStats,
}

impl<C: PoseConnection> StreamSession<C> {
    pub fn new(connection: C, detector: PoseResult<PoseDetector>, flow_control: FlowControl) -> Self {
        let (detector, startup_error) = match detector {
            Ok(detector) => (Some(detector), None),
            Err(e) => (None, Some(e)),
        };

        Self {
            id: Uuid::new_v4(),
            connection,
            detector,
            startup_error,
            flow_control,
            messages_sent: 0,
            acks_received: 0,
            final_stats: LoopStats::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run the session to completion and tear it down
    pub async fn run(&mut self) -> SessionSummary {
        tracing::info!(session_id = %self.id, flow_control = ?self.flow_control, "Session started");

        let end = match self.startup_error.take() {
            Some(error) => {
                self.report_startup_failure(&error).await;
                SessionEnd::StartupFailed
            }
            None => self.stream().await,
        };

        self.connection.close().await;
        let capture = self.stop().await;

        let summary = SessionSummary {
            session_id: self.id,
            messages_sent: self.messages_sent,
            acks_received: self.acks_received,
            end,
            capture,
        };
        tracing::info!(
            session_id = %self.id,
            end = ?summary.end,
            messages_sent = summary.messages_sent,
            acks_received = summary.acks_received,
            "Session finished"
        );
        summary
    }

    /// Stop the capture loop and release the camera. Idempotent.
    pub async fn stop(&mut self) -> LoopStats {
        if let Some(detector) = self.detector.take() {
            self.final_stats = detector.stop().await;
        }
        self.final_stats
    }

    /// The one explicit error payload: sent once, then the session ends
    async fn report_startup_failure(&mut self, error: &PoseError) {
        tracing::warn!(session_id = %self.id, error = %error, "Capture loop failed to start");

        let json = match PoseMessage::error(error.to_string()).to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Failed to serialize error message");
                return;
            }
        };

        if let Err(e) = self.connection.send_text(json).await {
            tracing::debug!(session_id = %self.id, error = %e, "Could not deliver startup error");
        }
    }

    async fn stream(&mut self) -> SessionEnd {
        let Some(detector) = self.detector.as_ref() else {
            return SessionEnd::CaptureEnded;
        };

        loop {
            let Some(frame) = detector.next_frame().await else {
                tracing::info!(session_id = %self.id, "Capture loop ended");
                return SessionEnd::CaptureEnded;
            };

            let json = match PoseMessage::from_frame(&frame).to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(session_id = %self.id, error = %e, "Failed to serialize pose frame");
                    continue;
                }
            };

            if let Err(e) = self.connection.send_text(json).await {
                tracing::debug!(session_id = %self.id, error = %e, "Send failed");
                return SessionEnd::SendFailed;
            }
            self.messages_sent += 1;
            tracing::trace!(
                session_id = %self.id,
                sequence = frame.sequence,
                landmarks = frame.landmarks.len(),
                "Pose frame sent"
            );

            // Continuous mode never reads the socket; a departed client shows
            // up as a failed send
            if self.flow_control == FlowControl::Acknowledged {
                match self.connection.receive().await {
                    Ok(()) => self.acks_received += 1,
                    Err(e) => {
                        tracing::debug!(session_id = %self.id, error = %e, "Client stopped acknowledging");
                        return SessionEnd::ClientDisconnected;
                    }
                }
            }
        }
    }
}
