//! Capture modes and the closed set of user-facing mode identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when translating between identifiers and capture modes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("Unsupported mode identifier: {0}")]
    UnsupportedModeIdentifier(i32),
    #[error("No mode identifier for resolution {width}x{height}")]
    UnknownResolution { width: u32, height: u32 },
}

/// A (width, height, frame rate) triple a stream can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureMode {
    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {} @ {}", self.width, self.height, self.fps)
    }
}

/// Mode identifiers referenced by configuration files and reconfigure requests.
///
/// The numeric values are part of the external configuration surface and
/// must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeId {
    /// 1280x1024 @ 15Hz
    #[serde(rename = "sxga_15hz")]
    Sxga15Hz = 1,
    /// 640x480 @ 30Hz
    #[serde(rename = "vga_30hz")]
    Vga30Hz = 2,
    /// 320x240 @ 30Hz
    #[serde(rename = "qvga_30hz")]
    Qvga30Hz = 3,
    /// 160x120 @ 30Hz
    #[serde(rename = "qqvga_30hz")]
    Qqvga30Hz = 4,
}

impl ModeId {
    pub const ALL: [ModeId; 4] = [
        ModeId::Sxga15Hz,
        ModeId::Vga30Hz,
        ModeId::Qvga30Hz,
        ModeId::Qqvga30Hz,
    ];

    /// Canonical capture mode for this identifier.
    pub const fn capture_mode(self) -> CaptureMode {
        match self {
            ModeId::Sxga15Hz => CaptureMode::new(1280, 1024, 15),
            ModeId::Vga30Hz => CaptureMode::new(640, 480, 30),
            ModeId::Qvga30Hz => CaptureMode::new(320, 240, 30),
            ModeId::Qqvga30Hz => CaptureMode::new(160, 120, 30),
        }
    }

    /// Identifier for a capture mode, matched on resolution only.
    pub fn from_mode(mode: &CaptureMode) -> Result<Self, ModeError> {
        ModeId::ALL
            .into_iter()
            .find(|id| {
                let canonical = id.capture_mode();
                canonical.width == mode.width && canonical.height == mode.height
            })
            .ok_or(ModeError::UnknownResolution {
                width: mode.width,
                height: mode.height,
            })
    }

    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ModeId {
    type Error = ModeError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ModeId::Sxga15Hz),
            2 => Ok(ModeId::Vga30Hz),
            3 => Ok(ModeId::Qvga30Hz),
            4 => Ok(ModeId::Qqvga30Hz),
            other => Err(ModeError::UnsupportedModeIdentifier(other)),
        }
    }
}

impl From<ModeId> for CaptureMode {
    fn from(id: ModeId) -> Self {
        id.capture_mode()
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeId::Sxga15Hz => "SXGA_15Hz",
            ModeId::Vga30Hz => "VGA_30Hz",
            ModeId::Qvga30Hz => "QVGA_30Hz",
            ModeId::Qqvga30Hz => "QQVGA_30Hz",
        };
        f.write_str(name)
    }
}

/// Translate a raw identifier into its canonical capture mode.
pub fn mode_for_id(id: i32) -> Result<CaptureMode, ModeError> {
    ModeId::try_from(id).map(ModeId::capture_mode)
}

/// Translate a capture mode back into its raw identifier.
pub fn id_for_mode(mode: &CaptureMode) -> Result<i32, ModeError> {
    ModeId::from_mode(mode).map(ModeId::as_i32)
}
