//! Wire messages published by the node (protobuf via prost).

use crate::calibration::CalibrationRecord;
use crate::image::PublishedImage;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    /// Acquisition time in nanoseconds
    #[prost(uint64, tag = "1")]
    pub acq_time: u64,
    /// Publish time in nanoseconds since the Unix epoch
    #[prost(uint64, tag = "2")]
    pub pub_time: u64,
    #[prost(uint32, tag = "3")]
    pub sequence: u32,
    #[prost(string, tag = "4")]
    pub frame_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawImage {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    #[prost(string, tag = "4")]
    pub encoding: String,
    #[prost(uint32, tag = "5")]
    pub step: u32,
    #[prost(bytes = "vec", tag = "6")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CameraInfo {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    #[prost(string, tag = "4")]
    pub distortion_model: String,
    #[prost(double, repeated, tag = "5")]
    pub d: Vec<f64>,
    #[prost(double, repeated, tag = "6")]
    pub k: Vec<f64>,
    #[prost(double, repeated, tag = "7")]
    pub r: Vec<f64>,
    #[prost(double, repeated, tag = "8")]
    pub p: Vec<f64>,
}

pub fn get_pub_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn header(image: &PublishedImage, frame_id: &str) -> Header {
    Header {
        acq_time: image.timestamp_ns,
        pub_time: get_pub_time(),
        sequence: image.sequence,
        frame_id: frame_id.to_string(),
    }
}

impl RawImage {
    pub fn from_image(image: &PublishedImage, frame_id: &str) -> Self {
        Self {
            header: Some(header(image, frame_id)),
            width: image.width,
            height: image.height,
            encoding: image.encoding.to_string(),
            step: image.step,
            data: image.data.clone(),
        }
    }
}

impl CameraInfo {
    /// Camera info stamped like the image it describes.
    pub fn from_calibration(
        calibration: &CalibrationRecord,
        image: &PublishedImage,
        frame_id: &str,
    ) -> Self {
        Self {
            header: Some(header(image, frame_id)),
            width: calibration.width,
            height: calibration.height,
            distortion_model: calibration.distortion_model.to_string(),
            d: calibration.d.to_vec(),
            k: calibration.k.to_vec(),
            r: calibration.r.to_vec(),
            p: calibration.p.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::encodings;
    use prost::Message;

    fn image() -> PublishedImage {
        PublishedImage {
            width: 2,
            height: 1,
            step: 6,
            encoding: encodings::RGB8,
            data: vec![1, 2, 3, 4, 5, 6],
            timestamp_ns: 1234,
            sequence: 7,
        }
    }

    #[test]
    fn test_raw_image_fields() {
        let msg = RawImage::from_image(&image(), "openni_rgb_optical_frame");
        let header = msg.header.as_ref().unwrap();
        assert_eq!(header.acq_time, 1234);
        assert_eq!(header.sequence, 7);
        assert_eq!(header.frame_id, "openni_rgb_optical_frame");
        assert_eq!(msg.encoding, "rgb8");
        assert_eq!(msg.step, 6);

        let decoded = RawImage::decode(msg.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_camera_info_matrices() {
        let calibration = CalibrationRecord::compute(640, 480, 525.0);
        let info = CameraInfo::from_calibration(&calibration, &image(), "rgb");
        assert_eq!(info.k.len(), 9);
        assert_eq!(info.r.len(), 9);
        assert_eq!(info.p.len(), 12);
        assert_eq!(info.d, vec![0.0; 5]);
        assert_eq!(info.k[0], info.k[4]);
        assert_eq!(info.p[2], 319.5);
        assert_eq!(info.distortion_model, "plumb_bob");
        assert_eq!((info.width, info.height), (640, 480));
    }
}
