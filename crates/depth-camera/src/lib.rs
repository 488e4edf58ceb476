//! Depth/RGB camera node for Bubbaloop.
//!
//! Opens a depth camera, negotiates color and depth output modes against
//! what the hardware supports and republishes:
//! - RGB8 images with matching camera info (`rgb/image_color`, `rgb/camera_info`)
//! - optional MONO8 images (`rgb/image_mono`)
//! - 16UC1 depth images with camera info (`depth/image`, `depth/camera_info`)
//!
//! Output modes can be switched at runtime through the `config` queryable.

pub mod calibration;
pub mod config;
pub mod context;
pub mod controller;
pub mod device;
pub mod error;
pub mod health;
pub mod image;
pub mod mode;
pub mod negotiator;
pub mod node;
pub mod protos;
pub mod publisher;
pub mod reconfigure;
pub mod runner;
pub mod synthetic;
pub mod zenoh_session;

pub use calibration::CalibrationRecord;
pub use config::{ConfigError, DriverConfig, NodeConfig};
pub use controller::{
    AppliedConfig, AppliedStream, ReconfigureError, StreamConfig, StreamConfigController,
    StreamPhase,
};
pub use device::{CameraDevice, DeviceDriver, DeviceError, DeviceInfo, DeviceSelector, Stream};
pub use error::NodeError;
pub use image::{PixelFormat, PublishedImage, RawColorFrame, RawDepthFrame};
pub use mode::{CaptureMode, ModeError, ModeId};
pub use negotiator::{negotiate, Negotiated, SupportedModeSet};
pub use node::DepthCameraNode;
pub use publisher::{ChannelPublisher, FramePublisher, Outbound, ZenohFramePublisher};
