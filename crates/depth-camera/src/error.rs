//! Error types for the depth camera node.

use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::mode::ModeError;
use thiserror::Error;

/// Errors that can occur while building or running the node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration file missing, unreadable or invalid
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Device enumeration or command failure
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// A device default mode outside the canonical tiers
    #[error("Mode error: {0}")]
    Mode(#[from] ModeError),

    /// Runtime error during node execution
    #[error("Runtime error: {0}")]
    Runtime(String),
}

