//! Pinhole calibration derived from the active resolution.

use serde::Serialize;

pub const PLUMB_BOB: &str = "plumb_bob";

/// Camera intrinsics snapshot published next to every image.
///
/// Square pixels, principal point at the image center, no distortion,
/// identity rotation and zero translation, so `P = K [I | 0]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationRecord {
    pub width: u32,
    pub height: u32,
    pub focal_length: f64,
    pub principal_point: (f64, f64),
    pub distortion_model: &'static str,
    pub d: [f64; 5],
    /// Row-major 3x3 intrinsic matrix
    pub k: [f64; 9],
    /// Row-major 3x3 rectification matrix
    pub r: [f64; 9],
    /// Row-major 3x4 projection matrix
    pub p: [f64; 12],
}

impl CalibrationRecord {
    /// Build the record for a `width` x `height` image with focal length `f`.
    ///
    /// The principal point uses integer halving of the dimensions before the
    /// half-pixel shift, so odd sizes land on `(w / 2) - 0.5`.
    pub fn compute(width: u32, height: u32, focal_length: f64) -> Self {
        let cx = (width / 2) as f64 - 0.5;
        let cy = (height / 2) as f64 - 0.5;

        let mut k = [0.0; 9];
        k[0] = focal_length;
        k[4] = focal_length;
        k[2] = cx;
        k[5] = cy;
        k[8] = 1.0;

        let mut r = [0.0; 9];
        r[0] = 1.0;
        r[4] = 1.0;
        r[8] = 1.0;

        let mut p = [0.0; 12];
        p[0] = k[0];
        p[5] = k[4];
        p[2] = k[2];
        p[6] = k[5];
        p[10] = 1.0;

        Self {
            width,
            height,
            focal_length,
            principal_point: (cx, cy),
            distortion_model: PLUMB_BOB,
            d: [0.0; 5],
            k,
            r,
            p,
        }
    }
}
