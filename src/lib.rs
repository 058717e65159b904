pub mod core;
pub mod models;
pub mod platform;

use core::config::Config;
use core::server::{PoseServer, ServerError};
use platform::camera::FfmpegCameraOpener;
use platform::pose::DefaultLandmarkerFactory;
use std::sync::Arc;

/// Run the pose stream server with the default camera and landmarker
/// backends until Ctrl-C.
pub async fn run(config: Config) -> Result<(), ServerError> {
    tracing::info!(
        device = %config.device_selector(),
        model_path = %config.model_path.display(),
        "Starting pose stream server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let camera = Arc::new(FfmpegCameraOpener::new());
    let landmarker = Arc::new(DefaultLandmarkerFactory::new(config.model_path.clone()));
    let server = PoseServer::new(config, camera, landmarker);
    server.serve().await
}
