//! The node itself: device frames in, converted images and camera info out.

use crate::calibration::CalibrationRecord;
use crate::config::NodeConfig;
use crate::controller::StreamConfigController;
use crate::device::{CameraDevice, Stream};
use crate::error::NodeError;
use crate::image::{rgb_to_mono, PublishedImage};
use crate::publisher::FramePublisher;
use crate::reconfigure::{self, ReconfigureReply, ReconfigureRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Converted frames waiting to be published. Kept short so a slow
/// transport drops frames instead of building latency.
const FRAME_QUEUE_DEPTH: usize = 4;

enum CapturedFrame {
    Color(PublishedImage, CalibrationRecord),
    Depth(PublishedImage, CalibrationRecord),
}

/// Depth camera node - republishes color/depth frames and camera info
pub struct DepthCameraNode {
    config: NodeConfig,
    controller: Arc<StreamConfigController>,
    publisher: Arc<dyn FramePublisher>,
    frame_rx: flume::Receiver<CapturedFrame>,
    // Stats
    dropped: Arc<AtomicU64>,
    published: u64,
    failed: u64,
    last_log: Instant,
}

impl DepthCameraNode {
    /// Build the controller for `device` and hook up its frame callbacks.
    /// Streams are started by [`run`](Self::run).
    pub fn new(
        config: NodeConfig,
        device: Arc<dyn CameraDevice>,
        publisher: Arc<dyn FramePublisher>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let controller = Arc::new(
            StreamConfigController::new(device.clone())?
                .with_mode_switch_timeout(config.mode_switch_timeout()),
        );
        let (frame_tx, frame_rx) = flume::bounded(FRAME_QUEUE_DEPTH);
        let dropped = Arc::new(AtomicU64::new(0));

        // Callbacks hold a weak controller so the device does not keep it alive
        device.register_color_callback(Box::new({
            let controller = Arc::downgrade(&controller);
            let tx = frame_tx.clone();
            let dropped = dropped.clone();
            move |frame| {
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                match controller.on_frame_captured(&frame) {
                    Ok((image, calibration)) => {
                        if tx.try_send(CapturedFrame::Color(image, calibration)).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => log::warn!("Dropping color frame {}: {}", frame.sequence, e),
                }
            }
        }));

        device.register_depth_callback(Box::new({
            let controller = Arc::downgrade(&controller);
            let tx = frame_tx;
            let dropped = dropped.clone();
            move |frame| {
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                match controller.on_depth_captured(&frame) {
                    Ok((image, calibration)) => {
                        if tx.try_send(CapturedFrame::Depth(image, calibration)).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => log::warn!("Dropping depth frame {}: {}", frame.sequence, e),
                }
            }
        }));

        Ok(Self {
            config,
            controller,
            publisher,
            frame_rx,
            dropped,
            published: 0,
            failed: 0,
            last_log: Instant::now(),
        })
    }

    pub fn controller(&self) -> &Arc<StreamConfigController> {
        &self.controller
    }

    /// Apply the modes from the config file, as a reconfigure request would.
    pub async fn apply_startup_modes(&self) -> Result<ReconfigureReply, NodeError> {
        let controller = self.controller.clone();
        let request = ReconfigureRequest {
            image_mode: self.config.image_mode.as_i32(),
            depth_mode: self.config.depth_mode.as_i32(),
        };
        let reply =
            tokio::task::spawn_blocking(move || reconfigure::handle_request(&controller, request))
                .await
                .map_err(|e| NodeError::Runtime(e.to_string()))?;
        if !reply.success {
            log::warn!(
                "Camera '{}' startup modes not fully applied: {}",
                self.config.name,
                reply.message
            );
        }
        Ok(reply)
    }

    async fn publish(&mut self, frame: CapturedFrame) {
        let result = match &frame {
            CapturedFrame::Color(image, calibration) => {
                match self.publisher.publish_color(image, calibration).await {
                    Ok(()) if self.config.publish_mono => {
                        self.publisher.publish_mono(&rgb_to_mono(image)).await
                    }
                    other => other,
                }
            }
            CapturedFrame::Depth(image, calibration) => {
                self.publisher.publish_depth(image, calibration).await
            }
        };

        match result {
            Ok(()) => self.published += 1,
            Err(e) => {
                self.failed += 1;
                log::warn!("[{}] Publish failed: {}", self.config.name, e);
            }
        }

        // Log stats every second
        if self.last_log.elapsed().as_secs() >= 1 {
            let image = self.controller.stream_config(Stream::Color);
            log::info!(
                "[{}] {} published, {} failed, {} dropped (image {}, depth {})",
                self.config.name,
                self.published,
                self.failed,
                self.dropped.load(Ordering::Relaxed),
                image.mode,
                self.controller.stream_config(Stream::Depth).mode,
            );
            self.last_log = Instant::now();
        }
    }

    /// Start the device streams and publish until shutdown.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<()>) -> Result<(), NodeError> {
        let device = self.controller.device().clone();
        device.start_stream(Stream::Color)?;
        if self.config.publish_depth {
            device.start_stream(Stream::Depth)?;
        }
        log::info!("Camera '{}' streaming", self.config.name);

        let frame_rx = self.frame_rx.clone();
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,

                Ok(frame) = frame_rx.recv_async() => {
                    self.publish(frame).await;
                }
            }
        }

        log::info!("Shutting down camera '{}'...", self.config.name);
        let _ = device.stop_stream(Stream::Color);
        if self.config.publish_depth {
            let _ = device.stop_stream(Stream::Depth);
        }

        Ok(())
    }
}
