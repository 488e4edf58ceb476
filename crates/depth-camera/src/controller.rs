//! Stream configuration state and the reconfiguration cycle.
//!
//! Each stream's [`StreamConfig`] sits behind its own lock. Frame callbacks
//! take a copy under a read lock, so a frame is always rendered with one
//! consistent (width, height) pair. Reconfigurations are serialized and
//! the device command runs outside the stream lock; the new config is only
//! written once the device has accepted the mode.

use crate::calibration::CalibrationRecord;
use crate::device::{CameraDevice, DeviceError, Stream};
use crate::image::{self, ImageError, PublishedImage, RawColorFrame, RawDepthFrame};
use crate::mode::{CaptureMode, ModeError, ModeId};
use crate::negotiator::negotiate;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// Errors from one stream's reconfiguration. The stream keeps its previous
/// configuration whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconfigureError {
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Timed out after {timeout:?} switching {stream} stream to {mode}")]
    Timeout {
        stream: Stream,
        mode: CaptureMode,
        timeout: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPhase {
    /// Device default, set at construction
    Default,
    /// Set by a successful reconfiguration
    Configured,
}

/// Active output mode of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamConfig {
    pub mode: CaptureMode,
    pub mode_id: ModeId,
    pub phase: StreamPhase,
}

/// Result of a successful per-stream reconfiguration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedStream {
    pub stream: Stream,
    pub requested: CaptureMode,
    pub config: StreamConfig,
    pub used_default: bool,
}

/// Per-stream outcome of [`StreamConfigController::apply_config`]
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedConfig {
    pub color: Result<AppliedStream, ReconfigureError>,
    pub depth: Result<AppliedStream, ReconfigureError>,
}

impl AppliedConfig {
    pub fn is_ok(&self) -> bool {
        self.color.is_ok() && self.depth.is_ok()
    }
}

/// Owns the color and depth [`StreamConfig`]s of one device.
pub struct StreamConfigController {
    device: Arc<dyn CameraDevice>,
    color: RwLock<StreamConfig>,
    depth: RwLock<StreamConfig>,
    reconfigure_lock: Mutex<()>,
    mode_switch_timeout: Option<Duration>,
    /// Mode switch that outlived its timeout and is still running or
    /// restoring the previous mode
    abandoned_switch: Mutex<Option<JoinHandle<()>>>,
}

/// Handshake between a timed-out caller and the mode-switch thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchWait {
    Waiting,
    Abandoned,
}

impl StreamConfigController {
    /// Initialize both streams from the device's default modes.
    ///
    /// Fails if a default mode has no identifier in the canonical set.
    pub fn new(device: Arc<dyn CameraDevice>) -> Result<Self, ModeError> {
        let initial = |stream| -> Result<StreamConfig, ModeError> {
            let mode = device.default_mode(stream);
            Ok(StreamConfig {
                mode,
                mode_id: ModeId::from_mode(&mode)?,
                phase: StreamPhase::Default,
            })
        };
        let color = initial(Stream::Color)?;
        let depth = initial(Stream::Depth)?;
        log::info!(
            "Initial image mode {} ({}), depth mode {} ({})",
            color.mode,
            color.mode_id,
            depth.mode,
            depth.mode_id
        );

        Ok(Self {
            device,
            color: RwLock::new(color),
            depth: RwLock::new(depth),
            reconfigure_lock: Mutex::new(()),
            mode_switch_timeout: None,
            abandoned_switch: Mutex::new(None),
        })
    }

    /// Bound every device mode switch by `timeout`.
    pub fn with_mode_switch_timeout(mut self, timeout: Duration) -> Self {
        self.mode_switch_timeout = Some(timeout);
        self
    }

    pub fn device(&self) -> &Arc<dyn CameraDevice> {
        &self.device
    }

    fn slot(&self, stream: Stream) -> &RwLock<StreamConfig> {
        match stream {
            Stream::Color => &self.color,
            Stream::Depth => &self.depth,
        }
    }

    /// Snapshot of a stream's active configuration.
    pub fn stream_config(&self, stream: Stream) -> StreamConfig {
        *self
            .slot(stream)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, stream: Stream, config: StreamConfig) {
        *self
            .slot(stream)
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Negotiate and apply new modes for both streams.
    ///
    /// Both identifiers are validated before anything is touched; an
    /// unknown identifier fails the whole call with no state change. After
    /// that each stream succeeds or fails on its own.
    pub fn apply_config(
        &self,
        color_id: i32,
        depth_id: i32,
    ) -> Result<AppliedConfig, ModeError> {
        let color_request = ModeId::try_from(color_id)?.capture_mode();
        let depth_request = ModeId::try_from(depth_id)?.capture_mode();

        let _guard = self
            .reconfigure_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let applied = AppliedConfig {
            color: self.apply_stream(Stream::Color, color_request),
            depth: self.apply_stream(Stream::Depth, depth_request),
        };
        Ok(applied)
    }

    fn apply_stream(
        &self,
        stream: Stream,
        requested: CaptureMode,
    ) -> Result<AppliedStream, ReconfigureError> {
        let supported = self.device.supported_modes(stream);
        let default = self.device.default_mode(stream);
        let negotiated = negotiate(&requested, &supported, &default);

        if negotiated.used_default {
            log::warn!(
                "Could not find any compatible {} output mode {}. Falling back to default mode {}.",
                stream,
                requested,
                negotiated.mode
            );
        }

        // Resolve the identifier first so a failure leaves the device untouched
        let mode_id = ModeId::from_mode(&negotiated.mode)?;
        let previous = self.stream_config(stream).mode;

        if let Err(e) = self.switch_mode(stream, negotiated.mode, previous) {
            log::error!(
                "Failed to set {} output mode {}: {}",
                stream,
                negotiated.mode,
                e
            );
            return Err(e);
        }

        let config = StreamConfig {
            mode: negotiated.mode,
            mode_id,
            phase: StreamPhase::Configured,
        };
        self.store(stream, config);
        log::info!("{} stream now {} ({})", stream, config.mode, config.mode_id);

        Ok(AppliedStream {
            stream,
            requested,
            config,
            used_default: negotiated.used_default,
        })
    }

    /// Block until a previously abandoned mode switch has finished.
    fn wait_abandoned_switch(&self) {
        let handle = self
            .abandoned_switch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            log::debug!("Waiting for an abandoned mode switch to finish");
            if handle.join().is_err() {
                log::error!("Abandoned mode switch thread panicked");
            }
        }
    }

    /// Command `mode` on the device, bounded by the mode-switch timeout.
    ///
    /// On timeout the device call keeps running on its thread. If it later
    /// succeeds, that thread commands `previous` again so the hardware
    /// matches the configuration the stream kept. The next switch waits for
    /// it, so only one device command is ever in flight.
    fn switch_mode(
        &self,
        stream: Stream,
        mode: CaptureMode,
        previous: CaptureMode,
    ) -> Result<(), ReconfigureError> {
        self.wait_abandoned_switch();

        let Some(timeout) = self.mode_switch_timeout else {
            return Ok(self.device.set_mode(stream, mode)?);
        };

        let (tx, rx) = flume::bounded(1);
        let wait = Arc::new(Mutex::new(SwitchWait::Waiting));
        let device = self.device.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-mode-switch", stream))
            .spawn({
                let wait = wait.clone();
                move || {
                    let result = device.set_mode(stream, mode);
                    let state = wait.lock().unwrap_or_else(PoisonError::into_inner);
                    if *state == SwitchWait::Waiting {
                        let _ = tx.send(result);
                        return;
                    }
                    if result.is_err() {
                        return;
                    }
                    log::warn!(
                        "Late {} mode switch to {} completed, restoring {}",
                        stream,
                        mode,
                        previous
                    );
                    if let Err(e) = device.set_mode(stream, previous) {
                        log::error!("Failed to restore {} output mode {}: {}", stream, previous, e);
                    }
                }
            })
            .map_err(|e| DeviceError::Driver(e.to_string()))?;

        let outcome = match rx.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(flume::RecvTimeoutError::Timeout) => {
                let mut state = wait.lock().unwrap_or_else(PoisonError::into_inner);
                // The result may have landed between the timeout and the lock
                match rx.try_recv() {
                    Ok(result) => Ok(result),
                    Err(_) => {
                        *state = SwitchWait::Abandoned;
                        Err(ReconfigureError::Timeout {
                            stream,
                            mode,
                            timeout,
                        })
                    }
                }
            }
            Err(flume::RecvTimeoutError::Disconnected) => Err(DeviceError::Driver(
                "mode switch worker exited without a result".to_string(),
            )
            .into()),
        };

        match outcome {
            Ok(result) => {
                if handle.join().is_err() {
                    log::error!("{} mode switch thread panicked", stream);
                }
                Ok(result?)
            }
            Err(e) => {
                *self
                    .abandoned_switch
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Err(e)
            }
        }
    }

    /// Calibration for the current color configuration.
    pub fn color_calibration(&self) -> CalibrationRecord {
        let config = self.stream_config(Stream::Color);
        calibration_for(config.mode, self.device.image_focal_length(config.mode.width))
    }

    /// Convert a color frame to RGB8 at the active color resolution and
    /// compute the matching calibration.
    pub fn on_frame_captured(
        &self,
        frame: &RawColorFrame,
    ) -> Result<(PublishedImage, CalibrationRecord), ImageError> {
        let config = self.stream_config(Stream::Color);
        let (width, height) = (config.mode.width, config.mode.height);
        let image = image::to_rgb8(frame, width, height)?;
        let calibration = calibration_for(config.mode, self.device.image_focal_length(width));
        Ok((image, calibration))
    }

    /// Convert a depth frame to 16UC1 at the active depth resolution.
    pub fn on_depth_captured(
        &self,
        frame: &RawDepthFrame,
    ) -> Result<(PublishedImage, CalibrationRecord), ImageError> {
        let config = self.stream_config(Stream::Depth);
        let (width, height) = (config.mode.width, config.mode.height);
        let image = image::depth_to_16uc1(frame, width, height)?;
        let calibration = calibration_for(config.mode, self.device.depth_focal_length(width));
        Ok((image, calibration))
    }
}

fn calibration_for(mode: CaptureMode, focal_length: f64) -> CalibrationRecord {
    CalibrationRecord::compute(mode.width, mode.height, focal_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ColorCallback, DepthCallback, DeviceInfo};
    use crate::image::PixelFormat;
    use crate::negotiator::SupportedModeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDevice {
        color: SupportedModeSet,
        fail_depth: bool,
        delay: Duration,
        set_calls: AtomicUsize,
    }

    impl FixedDevice {
        fn new() -> Self {
            Self {
                color: SupportedModeSet::new(vec![
                    CaptureMode::new(640, 480, 30),
                    CaptureMode::new(320, 240, 30),
                ]),
                fail_depth: false,
                delay: Duration::ZERO,
                set_calls: AtomicUsize::new(0),
            }
        }
    }

    impl CameraDevice for FixedDevice {
        fn info(&self) -> DeviceInfo {
            DeviceInfo {
                vendor_id: 0x1d27,
                product_id: 0x0600,
                bus: 1,
                address: 1,
                serial: "fixed".to_string(),
            }
        }
        fn supported_modes(&self, stream: Stream) -> SupportedModeSet {
            match stream {
                Stream::Color => self.color.clone(),
                Stream::Depth => SupportedModeSet::new(vec![CaptureMode::new(640, 480, 30)]),
            }
        }
        fn default_mode(&self, _stream: Stream) -> CaptureMode {
            CaptureMode::new(640, 480, 30)
        }
        fn set_mode(&self, stream: Stream, mode: CaptureMode) -> Result<(), DeviceError> {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if stream == Stream::Depth && self.fail_depth {
                return Err(DeviceError::CommandFailed {
                    stream,
                    mode,
                    reason: "usb stall".to_string(),
                });
            }
            Ok(())
        }
        fn image_focal_length(&self, width: u32) -> f64 {
            1050.0 * width as f64 / 1280.0
        }
        fn depth_focal_length(&self, width: u32) -> f64 {
            1151.6314 * width as f64 / 1280.0
        }
        fn register_color_callback(&self, _callback: ColorCallback) {}
        fn register_depth_callback(&self, _callback: DepthCallback) {}
        fn start_stream(&self, _stream: Stream) -> Result<(), DeviceError> {
            Ok(())
        }
        fn stop_stream(&self, _stream: Stream) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn frame(width: u32, height: u32) -> RawColorFrame {
        RawColorFrame {
            width,
            height,
            format: PixelFormat::Rgb8,
            data: vec![10; (width * height * 3) as usize],
            timestamp_ns: 0,
            sequence: 0,
        }
    }

    #[test]
    fn test_starts_in_default_phase() {
        let controller = StreamConfigController::new(Arc::new(FixedDevice::new())).unwrap();
        let color = controller.stream_config(Stream::Color);
        assert_eq!(color.mode_id, ModeId::Vga30Hz);
        assert_eq!(color.phase, StreamPhase::Default);
    }

    #[test]
    fn test_supported_request_is_applied() {
        let controller = StreamConfigController::new(Arc::new(FixedDevice::new())).unwrap();
        let applied = controller.apply_config(3, 2).unwrap();
        let color = applied.color.unwrap();
        assert!(!color.used_default);
        assert_eq!(color.config.mode, CaptureMode::new(320, 240, 30));
        assert_eq!(color.config.phase, StreamPhase::Configured);
        assert_eq!(
            controller.stream_config(Stream::Color).mode_id,
            ModeId::Qvga30Hz
        );
    }

    #[test]
    fn test_fallback_reports_applied_identifier() {
        let controller = StreamConfigController::new(Arc::new(FixedDevice::new())).unwrap();
        let applied = controller.apply_config(1, 1).unwrap();
        let color = applied.color.unwrap();
        assert!(color.used_default);
        assert_eq!(color.requested, CaptureMode::new(1280, 1024, 15));
        assert_eq!(color.config.mode_id, ModeId::Vga30Hz);
        assert_eq!(
            controller.stream_config(Stream::Color).mode,
            CaptureMode::new(640, 480, 30)
        );
    }

    #[test]
    fn test_unsupported_identifier_leaves_state_untouched() {
        let device = Arc::new(FixedDevice::new());
        let controller = StreamConfigController::new(device.clone()).unwrap();
        controller.apply_config(3, 2).unwrap();
        let before = (
            controller.stream_config(Stream::Color),
            controller.stream_config(Stream::Depth),
        );
        let calls = device.set_calls.load(Ordering::SeqCst);

        assert_eq!(
            controller.apply_config(3, 9),
            Err(ModeError::UnsupportedModeIdentifier(9))
        );
        assert_eq!(
            controller.apply_config(0, 2),
            Err(ModeError::UnsupportedModeIdentifier(0))
        );
        assert_eq!(device.set_calls.load(Ordering::SeqCst), calls);
        assert_eq!(
            (
                controller.stream_config(Stream::Color),
                controller.stream_config(Stream::Depth),
            ),
            before
        );
    }

    #[test]
    fn test_device_failure_is_stream_local() {
        let mut device = FixedDevice::new();
        device.fail_depth = true;
        let controller = StreamConfigController::new(Arc::new(device)).unwrap();

        let applied = controller.apply_config(3, 2).unwrap();
        assert!(!applied.is_ok());
        assert!(applied.color.is_ok());
        assert!(matches!(
            applied.depth,
            Err(ReconfigureError::Device(DeviceError::CommandFailed { .. }))
        ));
        assert_eq!(
            controller.stream_config(Stream::Depth).phase,
            StreamPhase::Default
        );
        assert_eq!(
            controller.stream_config(Stream::Color).mode_id,
            ModeId::Qvga30Hz
        );
    }

    #[test]
    fn test_mode_switch_timeout_keeps_previous_state() {
        let mut device = FixedDevice::new();
        device.delay = Duration::from_millis(100);
        let device = Arc::new(device);
        let controller = StreamConfigController::new(device.clone())
            .unwrap()
            .with_mode_switch_timeout(Duration::from_millis(20));

        let applied = controller.apply_config(3, 2).unwrap();
        assert!(matches!(
            applied.color,
            Err(ReconfigureError::Timeout {
                stream: Stream::Color,
                ..
            })
        ));
        assert_eq!(
            controller.stream_config(Stream::Color).mode,
            CaptureMode::new(640, 480, 30)
        );

        // Each late switch is followed by a restore of the previous mode
        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(device.set_calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_frame_uses_active_dimensions() {
        let controller = StreamConfigController::new(Arc::new(FixedDevice::new())).unwrap();
        let (image, calibration) = controller.on_frame_captured(&frame(640, 480)).unwrap();
        assert_eq!((image.width, image.height, image.step), (640, 480, 1920));
        assert_eq!(image.data.len(), 640 * 480 * 3);
        assert_eq!(calibration.principal_point, (319.5, 239.5));
        assert_eq!(calibration.k[2], 319.5);
        assert_eq!(calibration.k[5], 239.5);
        assert_eq!(calibration.k[0], 525.0);
        assert_eq!(calibration.k[4], 525.0);

        controller.apply_config(3, 2).unwrap();
        let (image, calibration) = controller.on_frame_captured(&frame(640, 480)).unwrap();
        assert_eq!((image.width, image.height, image.step), (320, 240, 960));
        assert_eq!(calibration.k[0], 262.5);
        assert_eq!(calibration, controller.color_calibration());
    }

    #[test]
    fn test_depth_frame_uses_depth_focal_length() {
        let controller = StreamConfigController::new(Arc::new(FixedDevice::new())).unwrap();
        let depth = RawDepthFrame {
            width: 640,
            height: 480,
            data: vec![1000; 640 * 480],
            timestamp_ns: 0,
            sequence: 0,
        };
        let (image, calibration) = controller.on_depth_captured(&depth).unwrap();
        assert_eq!(image.step, 1280);
        assert!((calibration.focal_length - 575.8157).abs() < 1e-9);
    }
}
