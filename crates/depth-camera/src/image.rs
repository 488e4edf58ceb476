//! Raw frames delivered by the device and the images republished from them.

use thiserror::Error;

/// Encoding tags carried by published images
pub mod encodings {
    pub const RGB8: &str = "rgb8";
    pub const MONO8: &str = "mono8";
    pub const TYPE_16UC1: &str = "16UC1";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("Empty frame: {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },
    #[error("Frame payload too short: expected {expected} bytes, got {actual}")]
    PayloadTooShort { expected: usize, actual: usize },
    #[error("Output buffer too small: expected {expected} bytes, got {actual}")]
    OutputTooSmall { expected: usize, actual: usize },
    #[error("Row stride {step} is smaller than {min} bytes")]
    StrideTooSmall { step: usize, min: usize },
}

/// Pixel layout of a raw color frame as produced by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    /// YUV 4:2:2 packed as U Y0 V Y1
    Uyvy,
    Mono8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Uyvy => 2,
            PixelFormat::Mono8 => 1,
        }
    }
}

/// A color frame handed over by the device callback
#[derive(Debug, Clone)]
pub struct RawColorFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    /// Device timestamp in nanoseconds
    pub timestamp_ns: u64,
    pub sequence: u32,
}

impl RawColorFrame {
    /// Bytes per row. UYVY rows hold whole pixel pairs, so an odd width
    /// carries one padding luma sample.
    pub fn row_bytes(&self) -> usize {
        let w = self.width as usize;
        match self.format {
            PixelFormat::Uyvy => w.div_ceil(2) * 4,
            format => w * format.bytes_per_pixel(),
        }
    }

    pub fn expected_len(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    fn validate(&self) -> Result<(), ImageError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.expected_len();
        if self.data.len() < expected {
            return Err(ImageError::PayloadTooShort {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        let w = self.width as usize;
        match self.format {
            PixelFormat::Rgb8 => {
                let i = (y * w + x) * 3;
                [self.data[i], self.data[i + 1], self.data[i + 2]]
            }
            PixelFormat::Bgr8 => {
                let i = (y * w + x) * 3;
                [self.data[i + 2], self.data[i + 1], self.data[i]]
            }
            PixelFormat::Mono8 => {
                let v = self.data[y * w + x];
                [v, v, v]
            }
            PixelFormat::Uyvy => {
                let pair = y * self.row_bytes() + (x / 2) * 4;
                let u = self.data[pair];
                let luma = if x & 1 == 0 {
                    self.data[pair + 1]
                } else {
                    self.data[pair + 3]
                };
                let v = self.data[pair + 2];
                yuv_to_rgb(luma, u, v)
            }
        }
    }
}

/// A depth frame in millimetres, row-major
#[derive(Debug, Clone)]
pub struct RawDepthFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
    pub timestamp_ns: u64,
    pub sequence: u32,
}

/// Image ready for publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedImage {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes
    pub step: u32,
    pub encoding: &'static str,
    pub data: Vec<u8>,
    pub timestamp_ns: u64,
    pub sequence: u32,
}

// Full-range BT.601, fixed point with 8 fractional bits
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as i32;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = y + ((359 * e) >> 8);
    let g = y - ((88 * d + 183 * e) >> 8);
    let b = y + ((454 * d) >> 8);
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Nearest-neighbour source coordinate for `dst` in a `dst_len` axis.
#[inline]
fn source_index(dst: usize, dst_len: usize, src_len: usize) -> usize {
    (dst as u64 * src_len as u64 / dst_len as u64) as usize
}

/// Write `frame` as RGB8 into `out`, resampled to `width` x `height`.
///
/// `out` must hold at least `height * step` bytes and `step` at least
/// `width * 3`. Padding bytes past `width * 3` in each row are left alone.
pub fn fill_rgb(
    frame: &RawColorFrame,
    width: u32,
    height: u32,
    out: &mut [u8],
    step: usize,
) -> Result<(), ImageError> {
    frame.validate()?;
    if width == 0 || height == 0 {
        return Err(ImageError::EmptyFrame { width, height });
    }
    let (w, h) = (width as usize, height as usize);
    if step < w * 3 {
        return Err(ImageError::StrideTooSmall {
            step,
            min: w * 3,
        });
    }
    if out.len() < h * step {
        return Err(ImageError::OutputTooSmall {
            expected: h * step,
            actual: out.len(),
        });
    }

    let (fw, fh) = (frame.width as usize, frame.height as usize);
    for y in 0..h {
        let sy = source_index(y, h, fh);
        let row = &mut out[y * step..y * step + w * 3];
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            let sx = source_index(x, w, fw);
            px.copy_from_slice(&frame.rgb_at(sx, sy));
        }
    }
    Ok(())
}

/// Convert a color frame into a tightly packed RGB8 image.
pub fn to_rgb8(frame: &RawColorFrame, width: u32, height: u32) -> Result<PublishedImage, ImageError> {
    let step = width as usize * 3;
    let mut data = vec![0u8; height as usize * step];
    fill_rgb(frame, width, height, &mut data, step)?;
    Ok(PublishedImage {
        width,
        height,
        step: step as u32,
        encoding: encodings::RGB8,
        data,
        timestamp_ns: frame.timestamp_ns,
        sequence: frame.sequence,
    })
}

/// Derive a MONO8 image from an RGB8 image.
pub fn rgb_to_mono(image: &PublishedImage) -> PublishedImage {
    let (w, h) = (image.width as usize, image.height as usize);
    let mut data = Vec::with_capacity(w * h);
    for y in 0..h {
        let row = &image.data[y * image.step as usize..y * image.step as usize + w * 3];
        data.extend(row.chunks_exact(3).map(|px| {
            let luma = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
            (luma / 1000) as u8
        }));
    }
    PublishedImage {
        width: image.width,
        height: image.height,
        step: image.width,
        encoding: encodings::MONO8,
        data,
        timestamp_ns: image.timestamp_ns,
        sequence: image.sequence,
    }
}

/// Convert a depth frame into a 16UC1 (little-endian) image.
pub fn depth_to_16uc1(
    frame: &RawDepthFrame,
    width: u32,
    height: u32,
) -> Result<PublishedImage, ImageError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(ImageError::EmptyFrame {
            width: frame.width,
            height: frame.height,
        });
    }
    if width == 0 || height == 0 {
        return Err(ImageError::EmptyFrame { width, height });
    }
    let (fw, fh) = (frame.width as usize, frame.height as usize);
    if frame.data.len() < fw * fh {
        return Err(ImageError::PayloadTooShort {
            expected: fw * fh * 2,
            actual: frame.data.len() * 2,
        });
    }

    let (w, h) = (width as usize, height as usize);
    let mut data = Vec::with_capacity(w * h * 2);
    for y in 0..h {
        let sy = source_index(y, h, fh);
        for x in 0..w {
            let sx = source_index(x, w, fw);
            data.extend_from_slice(&frame.data[sy * fw + sx].to_le_bytes());
        }
    }
    Ok(PublishedImage {
        width,
        height,
        step: width * 2,
        encoding: encodings::TYPE_16UC1,
        data,
        timestamp_ns: frame.timestamp_ns,
        sequence: frame.sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_frame(width: u32, height: u32) -> RawColorFrame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 7]);
            }
        }
        RawColorFrame {
            width,
            height,
            format: PixelFormat::Rgb8,
            data,
            timestamp_ns: 42,
            sequence: 3,
        }
    }

    #[test]
    fn test_rgb8_same_size_is_copy() {
        let frame = rgb_frame(4, 2);
        let image = to_rgb8(&frame, 4, 2).unwrap();
        assert_eq!(image.step, 12);
        assert_eq!(image.data, frame.data);
        assert_eq!(image.encoding, encodings::RGB8);
        assert_eq!(image.timestamp_ns, 42);
        assert_eq!(image.sequence, 3);
    }

    #[test]
    fn test_rgb8_downsample_by_two() {
        let frame = rgb_frame(8, 4);
        let image = to_rgb8(&frame, 4, 2).unwrap();
        assert_eq!(image.data.len(), 4 * 2 * 3);
        // pixel (1, 1) samples source (2, 2)
        let i = (4 + 1) * 3;
        assert_eq!(&image.data[i..i + 3], &[2, 2, 7]);
    }

    #[test]
    fn test_rgb8_upsample_keeps_exact_size() {
        let frame = rgb_frame(2, 2);
        let image = to_rgb8(&frame, 6, 4).unwrap();
        assert_eq!(image.data.len(), 6 * 4 * 3);
        assert_eq!(image.step, 18);
    }

    #[test]
    fn test_bgr_is_swapped() {
        let frame = RawColorFrame {
            width: 1,
            height: 1,
            format: PixelFormat::Bgr8,
            data: vec![1, 2, 3],
            timestamp_ns: 0,
            sequence: 0,
        };
        assert_eq!(to_rgb8(&frame, 1, 1).unwrap().data, vec![3, 2, 1]);
    }

    #[test]
    fn test_uyvy_neutral_chroma_is_gray() {
        let frame = RawColorFrame {
            width: 2,
            height: 1,
            format: PixelFormat::Uyvy,
            data: vec![128, 50, 128, 200],
            timestamp_ns: 0,
            sequence: 0,
        };
        let image = to_rgb8(&frame, 2, 1).unwrap();
        assert_eq!(image.data, vec![50, 50, 50, 200, 200, 200]);
    }

    #[test]
    fn test_uyvy_odd_width_rows_hold_whole_pairs() {
        // Two rows of width 3: each row is two pairs (8 bytes), the last
        // luma sample of each row is padding
        let frame = RawColorFrame {
            width: 3,
            height: 2,
            format: PixelFormat::Uyvy,
            data: vec![
                128, 10, 128, 20, 128, 30, 128, 0, //
                128, 40, 128, 50, 128, 60, 128, 0,
            ],
            timestamp_ns: 0,
            sequence: 0,
        };
        assert_eq!(frame.row_bytes(), 8);
        let image = to_rgb8(&frame, 3, 2).unwrap();
        let luma: Vec<u8> = image.data.chunks_exact(3).map(|px| px[0]).collect();
        assert_eq!(luma, vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_uyvy_odd_width_short_payload_is_rejected() {
        let frame = RawColorFrame {
            width: 3,
            height: 1,
            format: PixelFormat::Uyvy,
            data: vec![128; 6],
            timestamp_ns: 0,
            sequence: 0,
        };
        assert!(matches!(
            to_rgb8(&frame, 3, 1),
            Err(ImageError::PayloadTooShort { expected: 8, actual: 6 })
        ));
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let mut frame = rgb_frame(4, 4);
        frame.data.truncate(10);
        assert!(matches!(
            to_rgb8(&frame, 4, 4),
            Err(ImageError::PayloadTooShort { expected: 48, actual: 10 })
        ));
    }

    #[test]
    fn test_fill_rgb_with_padded_stride() {
        let frame = rgb_frame(2, 2);
        let mut out = vec![0xAA; 2 * 8];
        fill_rgb(&frame, 2, 2, &mut out, 8).unwrap();
        assert_eq!(&out[6..8], &[0xAA, 0xAA]);
        assert_eq!(&out[8..11], &[0, 1, 7]);
    }

    #[test]
    fn test_fill_rgb_rejects_small_stride() {
        let frame = rgb_frame(2, 2);
        let mut out = vec![0; 64];
        assert!(matches!(
            fill_rgb(&frame, 2, 2, &mut out, 5),
            Err(ImageError::StrideTooSmall { .. })
        ));
    }

    #[test]
    fn test_mono_from_rgb() {
        let image = PublishedImage {
            width: 2,
            height: 1,
            step: 6,
            encoding: encodings::RGB8,
            data: vec![255, 255, 255, 255, 0, 0],
            timestamp_ns: 0,
            sequence: 0,
        };
        let mono = rgb_to_mono(&image);
        assert_eq!(mono.step, 2);
        assert_eq!(mono.encoding, encodings::MONO8);
        assert_eq!(mono.data, vec![255, 76]);
    }

    #[test]
    fn test_depth_16uc1_layout() {
        let frame = RawDepthFrame {
            width: 2,
            height: 2,
            data: vec![1000, 2000, 3000, 4000],
            timestamp_ns: 9,
            sequence: 1,
        };
        let image = depth_to_16uc1(&frame, 2, 2).unwrap();
        assert_eq!(image.step, 4);
        assert_eq!(image.encoding, encodings::TYPE_16UC1);
        assert_eq!(&image.data[0..2], &1000u16.to_le_bytes());
        assert_eq!(&image.data[6..8], &4000u16.to_le_bytes());

        let half = depth_to_16uc1(&frame, 1, 1).unwrap();
        assert_eq!(half.data, 1000u16.to_le_bytes().to_vec());
    }
}
