use crate::controller::{StreamConfig, StreamConfigController};
use crate::device::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic status snapshot of the camera
#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub camera: String,
    pub image: StreamConfig,
    pub depth: StreamConfig,
}

impl CameraStatus {
    pub fn snapshot(camera: &str, controller: &StreamConfigController) -> Self {
        Self {
            camera: camera.to_string(),
            image: controller.stream_config(Stream::Color),
            depth: controller.stream_config(Stream::Depth),
        }
    }
}

/// Spawn a background task that publishes the camera status every 5 seconds.
///
/// Stops when the shutdown signal fires.
pub async fn spawn_status_heartbeat(
    session: Arc<zenoh::Session>,
    topic: String,
    camera: String,
    controller: Arc<StreamConfigController>,
    mut shutdown_rx: watch::Receiver<()>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    log::info!("Status heartbeat: {}", topic);
    let publisher = session
        .declare_publisher(topic)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create status publisher: {}", e))?;

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    log::debug!("Status heartbeat stopping");
                    break;
                }
                _ = interval.tick() => {
                    let status = CameraStatus::snapshot(&camera, &controller);
                    let payload = match serde_json::to_vec(&status) {
                        Ok(p) => p,
                        Err(e) => {
                            log::warn!("Failed to encode status: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = publisher.put(payload).await {
                        log::warn!("Status heartbeat failed: {}", e);
                    }
                }
            }
        }
    });

    Ok(handle)
}
