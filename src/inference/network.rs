//! Seams between the pipeline and the pretrained networks.
//!
//! Networks are opaque numerical transforms. The pipeline only relies on the
//! shapes documented on each trait; the ONNX Runtime implementation lives in
//! [`super::onnx`].

use super::device::ExecutionTarget;
use crate::error::Result;
use crate::registry::{DetectorSpec, ModelSpec, UpsamplerSpec};
use image::{Rgb32FImage, RgbImage};
use std::path::Path;

/// An image-to-image network.
///
/// Input and output are RGB with channel values in `[0, 1]`. Restoration
/// networks map a 512x512 aligned face to a 512x512 face; super-resolution
/// networks map `w x h` to `(w * scale) x (h * scale)`.
pub trait Network: Send {
    /// Run one forward pass.
    fn forward(&mut self, input: &Rgb32FImage) -> Result<Rgb32FImage>;
}

/// A face found by the detector, in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedFace {
    /// Bounding box `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
    /// Detector confidence in `[0, 1]`.
    pub score: f32,
    /// Left eye, right eye, nose, left mouth corner, right mouth corner.
    pub landmarks: [[f32; 2]; 5],
}

impl DetectedFace {
    /// Distance between the two eye landmarks.
    pub fn eye_distance(&self) -> f32 {
        let [lx, ly] = self.landmarks[0];
        let [rx, ry] = self.landmarks[1];
        (rx - lx).hypot(ry - ly)
    }
}

/// A face detector producing five-point landmarks.
pub trait FaceDetector: Send {
    /// Detect faces in an RGB image.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>>;
}

/// Builds networks from weight files.
///
/// Loading is the expensive step of engine construction; implementations
/// report failures as [`crate::Error::ModelInit`].
pub trait NetworkLoader: Send + Sync {
    /// Load a face restoration network.
    fn load_restorer(
        &self,
        spec: &ModelSpec,
        weights: &Path,
        target: ExecutionTarget,
    ) -> Result<Box<dyn Network>>;

    /// Load a background super-resolution network.
    fn load_upsampler(
        &self,
        spec: &UpsamplerSpec,
        weights: &Path,
        target: ExecutionTarget,
    ) -> Result<Box<dyn Network>>;

    /// Load the face detector.
    fn load_detector(
        &self,
        spec: &DetectorSpec,
        weights: &Path,
        target: ExecutionTarget,
    ) -> Result<Box<dyn FaceDetector>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_distance() {
        let face = DetectedFace {
            bbox: [0.0, 0.0, 10.0, 10.0],
            score: 0.99,
            landmarks: [[1.0, 1.0], [4.0, 5.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0]],
        };
        assert!((face.eye_distance() - 5.0).abs() < f32::EPSILON);
    }
}
