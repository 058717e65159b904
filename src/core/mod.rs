pub mod config;
pub mod server;

// Capture, inference and hand-off
pub mod pose_detector;
pub mod transfer_channel;

// Per-client streaming
pub mod stream_session;

// Preview and diagnostics
pub mod overlay;

#[cfg(test)]
pub(crate) mod test_support;
