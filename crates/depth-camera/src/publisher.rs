//! Outbound side: where converted images and camera info go.

use crate::calibration::CalibrationRecord;
use crate::context::NodeContext;
use crate::image::PublishedImage;
use crate::protos::{CameraInfo, RawImage};
use async_trait::async_trait;
use prost::Message;
use thiserror::Error;
use zenoh::bytes::ZBytes;
use zenoh::pubsub::Publisher;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Zenoh error: {0}")]
    Zenoh(String),
    #[error("Publisher channel closed")]
    Closed,
}

/// Sink for everything the node publishes per frame
#[async_trait]
pub trait FramePublisher: Send + Sync {
    async fn publish_color(
        &self,
        image: &PublishedImage,
        calibration: &CalibrationRecord,
    ) -> Result<(), PublishError>;

    async fn publish_mono(&self, image: &PublishedImage) -> Result<(), PublishError>;

    async fn publish_depth(
        &self,
        image: &PublishedImage,
        calibration: &CalibrationRecord,
    ) -> Result<(), PublishError>;
}

/// Topic suffixes under the node's scoped prefix
pub mod topics {
    pub const RGB_IMAGE: &str = "rgb/image_color";
    pub const RGB_INFO: &str = "rgb/camera_info";
    pub const RGB_MONO: &str = "rgb/image_mono";
    pub const DEPTH_IMAGE: &str = "depth/image";
    pub const DEPTH_INFO: &str = "depth/camera_info";
    pub const CONFIG: &str = "config";
    pub const STATUS: &str = "status";
}

/// Publishes protobuf `RawImage` / `CameraInfo` messages over Zenoh
pub struct ZenohFramePublisher {
    rgb_image: Publisher<'static>,
    rgb_info: Publisher<'static>,
    rgb_mono: Publisher<'static>,
    depth_image: Publisher<'static>,
    depth_info: Publisher<'static>,
    rgb_frame_id: String,
    depth_frame_id: String,
}

async fn declare(ctx: &NodeContext, camera: &str, suffix: &str) -> Result<Publisher<'static>, PublishError> {
    let topic = ctx.topic(&format!("{}/{}", camera, suffix));
    let publisher = ctx
        .session
        .declare_publisher(topic.clone())
        .await
        .map_err(|e| PublishError::Zenoh(format!("Failed to declare '{}': {}", topic, e)))?;
    log::info!("Camera '{}' publishing to '{}'", camera, topic);
    Ok(publisher)
}

impl ZenohFramePublisher {
    pub async fn new(
        ctx: &NodeContext,
        camera: &str,
        rgb_frame_id: &str,
        depth_frame_id: &str,
    ) -> Result<Self, PublishError> {
        Ok(Self {
            rgb_image: declare(ctx, camera, topics::RGB_IMAGE).await?,
            rgb_info: declare(ctx, camera, topics::RGB_INFO).await?,
            rgb_mono: declare(ctx, camera, topics::RGB_MONO).await?,
            depth_image: declare(ctx, camera, topics::DEPTH_IMAGE).await?,
            depth_info: declare(ctx, camera, topics::DEPTH_INFO).await?,
            rgb_frame_id: rgb_frame_id.to_string(),
            depth_frame_id: depth_frame_id.to_string(),
        })
    }

    async fn put<M: Message>(publisher: &Publisher<'static>, msg: &M) -> Result<(), PublishError> {
        publisher
            .put(ZBytes::from(msg.encode_to_vec()))
            .await
            .map_err(|e| PublishError::Zenoh(e.to_string()))
    }
}

#[async_trait]
impl FramePublisher for ZenohFramePublisher {
    async fn publish_color(
        &self,
        image: &PublishedImage,
        calibration: &CalibrationRecord,
    ) -> Result<(), PublishError> {
        let info = CameraInfo::from_calibration(calibration, image, &self.rgb_frame_id);
        Self::put(&self.rgb_info, &info).await?;
        Self::put(&self.rgb_image, &RawImage::from_image(image, &self.rgb_frame_id)).await
    }

    async fn publish_mono(&self, image: &PublishedImage) -> Result<(), PublishError> {
        Self::put(&self.rgb_mono, &RawImage::from_image(image, &self.rgb_frame_id)).await
    }

    async fn publish_depth(
        &self,
        image: &PublishedImage,
        calibration: &CalibrationRecord,
    ) -> Result<(), PublishError> {
        let info = CameraInfo::from_calibration(calibration, image, &self.depth_frame_id);
        Self::put(&self.depth_info, &info).await?;
        Self::put(&self.depth_image, &RawImage::from_image(image, &self.depth_frame_id)).await
    }
}

/// What [`ChannelPublisher`] forwards
#[derive(Debug, Clone)]
pub enum Outbound {
    Color {
        image: PublishedImage,
        calibration: CalibrationRecord,
    },
    Mono(PublishedImage),
    Depth {
        image: PublishedImage,
        calibration: CalibrationRecord,
    },
}

/// In-process publisher backed by a flume channel
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: flume::Sender<Outbound>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, flume::Receiver<Outbound>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, msg: Outbound) -> Result<(), PublishError> {
        self.tx.send(msg).map_err(|_| PublishError::Closed)
    }
}

#[async_trait]
impl FramePublisher for ChannelPublisher {
    async fn publish_color(
        &self,
        image: &PublishedImage,
        calibration: &CalibrationRecord,
    ) -> Result<(), PublishError> {
        self.send(Outbound::Color {
            image: image.clone(),
            calibration: calibration.clone(),
        })
    }

    async fn publish_mono(&self, image: &PublishedImage) -> Result<(), PublishError> {
        self.send(Outbound::Mono(image.clone()))
    }

    async fn publish_depth(
        &self,
        image: &PublishedImage,
        calibration: &CalibrationRecord,
    ) -> Result<(), PublishError> {
        self.send(Outbound::Depth {
            image: image.clone(),
            calibration: calibration.clone(),
        })
    }
}
