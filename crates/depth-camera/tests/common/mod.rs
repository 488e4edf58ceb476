//! Test helpers for stream configuration tests

#![allow(dead_code)]

use depth_camera::device::{ColorCallback, DepthCallback};
use depth_camera::{
    CameraDevice, CaptureMode, DeviceError, DeviceInfo, PixelFormat, RawColorFrame, Stream,
    SupportedModeSet,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const VGA: CaptureMode = CaptureMode {
    width: 640,
    height: 480,
    fps: 30,
};
pub const QVGA: CaptureMode = CaptureMode {
    width: 320,
    height: 240,
    fps: 30,
};
pub const SXGA: CaptureMode = CaptureMode {
    width: 1280,
    height: 1024,
    fps: 15,
};

/// Device with fixed capabilities that records every mode switch
pub struct ScriptedDevice {
    pub color_modes: Vec<CaptureMode>,
    pub depth_modes: Vec<CaptureMode>,
    pub color_default: CaptureMode,
    pub depth_default: CaptureMode,
    /// Streams whose `set_mode` always fails
    pub failing: Vec<Stream>,
    /// Time each `set_mode` call blocks for
    pub switch_delay: Duration,
    pub set_mode_calls: Mutex<Vec<(Stream, CaptureMode)>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedDevice {
    /// Color supports VGA and QVGA, depth VGA only; both default to VGA.
    pub fn new() -> Self {
        Self {
            color_modes: vec![VGA, QVGA],
            depth_modes: vec![VGA],
            color_default: VGA,
            depth_default: VGA,
            failing: Vec::new(),
            switch_delay: Duration::ZERO,
            set_mode_calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<(Stream, CaptureMode)> {
        self.set_mode_calls.lock().unwrap().clone()
    }

    /// Mode the device ended up in after its last completed switch
    pub fn last_mode(&self, stream: Stream) -> Option<CaptureMode> {
        self.calls()
            .into_iter()
            .rev()
            .find(|(s, _)| *s == stream)
            .map(|(_, mode)| mode)
    }

    /// Highest number of `set_mode` calls seen running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl CameraDevice for ScriptedDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            vendor_id: 0x1d27,
            product_id: 0x0600,
            bus: 1,
            address: 4,
            serial: "SCRIPTED".to_string(),
        }
    }

    fn supported_modes(&self, stream: Stream) -> SupportedModeSet {
        match stream {
            Stream::Color => SupportedModeSet::new(self.color_modes.clone()),
            Stream::Depth => SupportedModeSet::new(self.depth_modes.clone()),
        }
    }

    fn default_mode(&self, stream: Stream) -> CaptureMode {
        match stream {
            Stream::Color => self.color_default,
            Stream::Depth => self.depth_default,
        }
    }

    fn set_mode(&self, stream: Stream, mode: CaptureMode) -> Result<(), DeviceError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.switch_delay.is_zero() {
            std::thread::sleep(self.switch_delay);
        }
        self.set_mode_calls.lock().unwrap().push((stream, mode));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing.contains(&stream) {
            return Err(DeviceError::CommandFailed {
                stream,
                mode,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn image_focal_length(&self, width: u32) -> f64 {
        525.0 * width as f64 / 640.0
    }

    fn depth_focal_length(&self, width: u32) -> f64 {
        575.8 * width as f64 / 640.0
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

/// A frame in `format` whose every pixel has luma `luma` and neutral chroma
pub fn flat_frame(format: PixelFormat, width: u32, height: u32, luma: u8) -> RawColorFrame {
    let data = match format {
        PixelFormat::Rgb8 | PixelFormat::Bgr8 => vec![luma; (width * height * 3) as usize],
        PixelFormat::Mono8 => vec![luma; (width * height) as usize],
        PixelFormat::Uyvy => {
            let pairs = width.div_ceil(2) * height;
            (0..pairs).flat_map(|_| [128, luma, 128, luma]).collect()
        }
    };
    RawColorFrame {
        width,
        height,
        format,
        data,
        timestamp_ns: 0,
        sequence: 0,
    }
}

/// A VGA RGB8 frame with a horizontal gradient
pub fn color_frame(sequence: u32) -> RawColorFrame {
    let (width, height) = (VGA.width, VGA.height);
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _y in 0..height {
        for x in 0..width {
            let v = (x % 256) as u8;
            data.extend_from_slice(&[v, v, v]);
        }
    }
    RawColorFrame {
        width,
        height,
        format: PixelFormat::Rgb8,
        data,
        timestamp_ns: sequence as u64 * 33_000_000,
        sequence,
    }
}
