//! Device collaborator contracts: capability queries, mode switches,
//! frame callbacks and device enumeration.

use crate::image::{RawColorFrame, RawDepthFrame};
use crate::mode::CaptureMode;
use crate::negotiator::SupportedModeSet;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// An independent image-producing channel of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Color,
    Depth,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Color => f.write_str("image"),
            Stream::Depth => f.write_str("depth"),
        }
    }
}

/// Errors reported by the device driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("No devices connected")]
    NoDeviceAvailable,
    #[error("No matching device found for '{0}'")]
    NotFound(String),
    #[error("Invalid device id '{0}'")]
    InvalidSelector(String),
    #[error("Device rejected {stream} mode {mode}: {reason}")]
    CommandFailed {
        stream: Stream,
        mode: CaptureMode,
        reason: String,
    },
    #[error("Driver error: {0}")]
    Driver(String),
}

pub type ColorCallback = Box<dyn Fn(RawColorFrame) + Send + Sync>;
pub type DepthCallback = Box<dyn Fn(RawDepthFrame) + Send + Sync>;

/// USB identity of an opened device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
    pub serial: String,
}

impl DeviceInfo {
    pub fn vendor_name(&self) -> &'static str {
        match self.vendor_id {
            0x1d27 => "Primesense",
            0x045e => "Kinect",
            _ => "unknown",
        }
    }
}

/// A depth/RGB camera as seen by the stream configuration layer.
///
/// Frame callbacks are invoked from a driver-owned thread. Implementations
/// deliver at most one frame at a time per stream.
pub trait CameraDevice: Send + Sync {
    fn info(&self) -> DeviceInfo;

    fn supported_modes(&self, stream: Stream) -> SupportedModeSet;

    fn default_mode(&self, stream: Stream) -> CaptureMode;

    /// Switch the stream's output mode. May block while the hardware settles.
    fn set_mode(&self, stream: Stream, mode: CaptureMode) -> Result<(), DeviceError>;

    /// Color focal length in pixels for an image `width` pixels wide.
    fn image_focal_length(&self, width: u32) -> f64;

    /// Depth focal length in pixels for an image `width` pixels wide.
    fn depth_focal_length(&self, width: u32) -> f64;

    fn register_color_callback(&self, callback: ColorCallback);

    fn register_depth_callback(&self, callback: DepthCallback);

    fn start_stream(&self, stream: Stream) -> Result<(), DeviceError>;

    fn stop_stream(&self, stream: Stream) -> Result<(), DeviceError>;
}

/// Enumerates the devices attached to the host.
pub trait DeviceDriver: Send + Sync {
    fn device_count(&self) -> usize;

    fn device_by_index(&self, index: usize) -> Result<Arc<dyn CameraDevice>, DeviceError>;

    fn device_by_address(&self, bus: u8, address: u8)
        -> Result<Arc<dyn CameraDevice>, DeviceError>;

    fn device_by_serial(&self, serial: &str) -> Result<Arc<dyn CameraDevice>, DeviceError>;
}

/// How the user picked a device on the command line or in the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    First,
    Index(usize),
    BusAddress { bus: u8, address: u8 },
    Serial(String),
}

impl FromStr for DeviceSelector {
    type Err = DeviceError;

    /// `""` selects the first device, `bus@address` a USB port, anything
    /// longer than two characters a serial number, otherwise an index.
    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(DeviceSelector::First);
        }
        let invalid = || DeviceError::InvalidSelector(id.to_string());
        if let Some((bus, address)) = id.split_once('@') {
            let bus = bus.parse().map_err(|_| invalid())?;
            let address = address.parse().map_err(|_| invalid())?;
            return Ok(DeviceSelector::BusAddress { bus, address });
        }
        if id.len() > 2 {
            return Ok(DeviceSelector::Serial(id.to_string()));
        }
        id.parse().map(DeviceSelector::Index).map_err(|_| invalid())
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::First => f.write_str("<first>"),
            DeviceSelector::Index(i) => write!(f, "#{}", i),
            DeviceSelector::BusAddress { bus, address } => write!(f, "{}@{}", bus, address),
            DeviceSelector::Serial(s) => f.write_str(s),
        }
    }
}

/// Open the device matching `selector`.
pub fn open_device(
    driver: &dyn DeviceDriver,
    selector: &DeviceSelector,
) -> Result<Arc<dyn CameraDevice>, DeviceError> {
    let count = driver.device_count();
    if count == 0 {
        return Err(DeviceError::NoDeviceAvailable);
    }
    log::info!("Number devices connected: {}", count);

    let device = match selector {
        DeviceSelector::First => {
            log::warn!("deviceID is not set! Using first device.");
            driver.device_by_index(0)
        }
        DeviceSelector::Index(index) => {
            log::info!("Searching for device with index = {}", index);
            driver.device_by_index(*index)
        }
        DeviceSelector::BusAddress { bus, address } => {
            log::info!("Searching for device with bus@address = {}@{}", bus, address);
            driver.device_by_address(*bus, *address)
        }
        DeviceSelector::Serial(serial) => {
            log::info!("Searching for device with serial number = {}", serial);
            driver.device_by_serial(serial)
        }
    }?;

    let info = device.info();
    log::info!(
        "Opened a {} device on bus {}:{} with serial number {}",
        info.vendor_name(),
        info.bus,
        info.address,
        info.serial
    );
    Ok(device)
}
