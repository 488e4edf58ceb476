//! Synthetic device for tests and hardware-less runs (`driver: {kind: synthetic}`).
//!
//! Behaves like a Kinect: color supports SXGA@15 and VGA@30, depth only
//! VGA@30, both default to VGA@30. Frames are test patterns generated on
//! one thread per started stream at the active mode's frame rate.

use crate::device::{
    CameraDevice, ColorCallback, DepthCallback, DeviceDriver, DeviceError, DeviceInfo, Stream,
};
use crate::image::{PixelFormat, RawColorFrame, RawDepthFrame};
use crate::mode::{CaptureMode, ModeId};
use crate::negotiator::SupportedModeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const KINECT_VENDOR_ID: u16 = 0x045e;
const KINECT_PRODUCT_ID: u16 = 0x02ae;
const RGB_FOCAL_LENGTH_SXGA: f64 = 1050.0;
const DEPTH_FOCAL_LENGTH_SXGA: f64 = 1151.6314;
const SXGA_WIDTH: f64 = 1280.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Driver exposing `count` synthetic devices
pub struct SyntheticDriver {
    devices: Vec<Arc<SyntheticDevice>>,
}

impl SyntheticDriver {
    pub fn new(count: usize) -> Self {
        let devices = (0..count)
            .map(|i| {
                Arc::new(SyntheticDevice::new(DeviceInfo {
                    vendor_id: KINECT_VENDOR_ID,
                    product_id: KINECT_PRODUCT_ID,
                    bus: 1,
                    address: 2 + i as u8,
                    serial: format!("SYN{:013}", i),
                }))
            })
            .collect();
        Self { devices }
    }
}

impl DeviceDriver for SyntheticDriver {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_by_index(&self, index: usize) -> Result<Arc<dyn CameraDevice>, DeviceError> {
        self.devices
            .get(index)
            .map(|d| d.clone() as Arc<dyn CameraDevice>)
            .ok_or_else(|| DeviceError::NotFound(format!("#{}", index)))
    }

    fn device_by_address(
        &self,
        bus: u8,
        address: u8,
    ) -> Result<Arc<dyn CameraDevice>, DeviceError> {
        self.devices
            .iter()
            .find(|d| d.info.bus == bus && d.info.address == address)
            .map(|d| d.clone() as Arc<dyn CameraDevice>)
            .ok_or_else(|| DeviceError::NotFound(format!("{}@{}", bus, address)))
    }

    fn device_by_serial(&self, serial: &str) -> Result<Arc<dyn CameraDevice>, DeviceError> {
        self.devices
            .iter()
            .find(|d| d.info.serial == serial)
            .map(|d| d.clone() as Arc<dyn CameraDevice>)
            .ok_or_else(|| DeviceError::NotFound(serial.to_string()))
    }
}

type SharedColorCallback = Arc<dyn Fn(RawColorFrame) + Send + Sync>;
type SharedDepthCallback = Arc<dyn Fn(RawDepthFrame) + Send + Sync>;

struct StreamState {
    mode: Mutex<CaptureMode>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamState {
    fn new(mode: CaptureMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }
}

struct Shared {
    color: StreamState,
    depth: StreamState,
    color_callback: Mutex<Option<SharedColorCallback>>,
    depth_callback: Mutex<Option<SharedDepthCallback>>,
}

impl Shared {
    fn stream(&self, stream: Stream) -> &StreamState {
        match stream {
            Stream::Color => &self.color,
            Stream::Depth => &self.depth,
        }
    }
}

/// A test-pattern camera
pub struct SyntheticDevice {
    info: DeviceInfo,
    color_modes: SupportedModeSet,
    depth_modes: SupportedModeSet,
    default: CaptureMode,
    shared: Arc<Shared>,
}

impl SyntheticDevice {
    pub fn new(info: DeviceInfo) -> Self {
        let default = ModeId::Vga30Hz.capture_mode();
        Self {
            info,
            color_modes: SupportedModeSet::new(vec![
                ModeId::Sxga15Hz.capture_mode(),
                ModeId::Vga30Hz.capture_mode(),
            ]),
            depth_modes: SupportedModeSet::new(vec![ModeId::Vga30Hz.capture_mode()]),
            default,
            shared: Arc::new(Shared {
                color: StreamState::new(default),
                depth: StreamState::new(default),
                color_callback: Mutex::new(None),
                depth_callback: Mutex::new(None),
            }),
        }
    }

    /// Mode the hardware is currently producing on `stream`.
    pub fn active_mode(&self, stream: Stream) -> CaptureMode {
        *lock(&self.shared.stream(stream).mode)
    }

    fn spawn_worker(&self, stream: Stream) -> JoinHandle<()> {
        let shared = self.shared.clone();
        std::thread::spawn(move || {
            let mut sequence: u32 = 0;
            while shared.stream(stream).running.load(Ordering::Acquire) {
                let mode = *lock(&shared.stream(stream).mode);
                match stream {
                    Stream::Color => {
                        let callback = lock(&shared.color_callback).clone();
                        if let Some(callback) = callback {
                            callback(color_pattern(mode, sequence));
                        }
                    }
                    Stream::Depth => {
                        let callback = lock(&shared.depth_callback).clone();
                        if let Some(callback) = callback {
                            callback(depth_pattern(mode, sequence));
                        }
                    }
                }
                sequence = sequence.wrapping_add(1);
                std::thread::sleep(Duration::from_secs(1) / mode.fps.max(1));
            }
            log::debug!("Synthetic {} stream stopped", stream);
        })
    }
}

fn color_pattern(mode: CaptureMode, sequence: u32) -> RawColorFrame {
    let (w, h) = (mode.width as usize, mode.height as usize);
    let mut data = Vec::with_capacity(w * h * 3);
    let shift = sequence as usize;
    for y in 0..h {
        for x in 0..w {
            data.extend_from_slice(&[
                ((x + shift) * 255 / w.max(1)) as u8,
                (y * 255 / h.max(1)) as u8,
                (shift % 256) as u8,
            ]);
        }
    }
    RawColorFrame {
        width: mode.width,
        height: mode.height,
        format: PixelFormat::Rgb8,
        data,
        timestamp_ns: now_ns(),
        sequence,
    }
}

fn depth_pattern(mode: CaptureMode, sequence: u32) -> RawDepthFrame {
    let (w, h) = (mode.width as usize, mode.height as usize);
    // Ramp from 500mm (left) to 4500mm (right)
    let data = (0..h)
        .flat_map(|_| (0..w).map(move |x| (500 + x * 4000 / w.max(1)) as u16))
        .collect();
    RawDepthFrame {
        width: mode.width,
        height: mode.height,
        data,
        timestamp_ns: now_ns(),
        sequence,
    }
}

impl CameraDevice for SyntheticDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn supported_modes(&self, stream: Stream) -> SupportedModeSet {
        match stream {
            Stream::Color => self.color_modes.clone(),
            Stream::Depth => self.depth_modes.clone(),
        }
    }

    fn default_mode(&self, _stream: Stream) -> CaptureMode {
        self.default
    }

    fn set_mode(&self, stream: Stream, mode: CaptureMode) -> Result<(), DeviceError> {
        if !self.supported_modes(stream).contains(&mode) {
            return Err(DeviceError::CommandFailed {
                stream,
                mode,
                reason: "mode not supported by sensor".to_string(),
            });
        }
        *lock(&self.shared.stream(stream).mode) = mode;
        log::debug!("Synthetic {} stream switched to {}", stream, mode);
        Ok(())
    }

    fn image_focal_length(&self, width: u32) -> f64 {
        RGB_FOCAL_LENGTH_SXGA * width as f64 / SXGA_WIDTH
    }

    fn depth_focal_length(&self, width: u32) -> f64 {
        DEPTH_FOCAL_LENGTH_SXGA * width as f64 / SXGA_WIDTH
    }

    fn register_color_callback(&self, callback: ColorCallback) {
        *lock(&self.shared.color_callback) = Some(Arc::from(callback));
    }

    fn register_depth_callback(&self, callback: DepthCallback) {
        *lock(&self.shared.depth_callback) = Some(Arc::from(callback));
    }

    fn start_stream(&self, stream: Stream) -> Result<(), DeviceError> {
        let state = self.shared.stream(stream);
        if state.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        *lock(&state.worker) = Some(self.spawn_worker(stream));
        log::info!("Synthetic {} stream started", stream);
        Ok(())
    }

    fn stop_stream(&self, stream: Stream) -> Result<(), DeviceError> {
        let state = self.shared.stream(stream);
        state.running.store(false, Ordering::Release);
        let worker = lock(&state.worker).take();
        // The worker itself may release the last handle from inside a callback
        if let Some(handle) = worker.filter(|h| h.thread().id() != std::thread::current().id()) {
            handle
                .join()
                .map_err(|_| DeviceError::Driver(format!("{} worker panicked", stream)))?;
        }
        Ok(())
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        let _ = self.stop_stream(Stream::Color);
        let _ = self.stop_stream(Stream::Depth);
    }
}
