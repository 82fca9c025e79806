//! Inference: device selection, network loading, tiled upsampling, face
//! restoration and the composed restoration engine.

pub mod device;
mod engine;
pub mod face;
mod network;
mod onnx;
pub mod tile;
mod upsampler;

#[cfg(test)]
pub(crate) mod fakes;

pub use device::{Device, ExecutionTarget, Precision, is_cuda_available};
pub use engine::{EngineBuilder, EngineKey, RestorationEngine, RestorationOutput, execute};
pub use network::{DetectedFace, FaceDetector, Network, NetworkLoader};
pub use onnx::OnnxLoader;
pub use upsampler::{BackgroundChoice, BackgroundUpsampler, UpsamplerConfig, UpsamplerFactory};

use image::{Rgb, Rgb32FImage, RgbImage};

/// Convert 8-bit RGB to `[0, 1]` floats.
pub fn to_rgb32f(image: &RgbImage) -> Rgb32FImage {
    Rgb32FImage::from_fn(image.width(), image.height(), |x, y| {
        Rgb(image.get_pixel(x, y).0.map(|v| f32::from(v) / 255.0))
    })
}

/// Convert `[0, 1]` floats to 8-bit RGB, rounding and clamping.
pub fn to_rgb8(image: &Rgb32FImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        Rgb(image
            .get_pixel(x, y)
            .0
            .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8))
    })
}
