//! Deterministic stand-ins for the pretrained networks, used by unit tests.

use super::device::ExecutionTarget;
use super::network::{DetectedFace, FaceDetector, Network, NetworkLoader};
use crate::error::{Error, Result};
use crate::registry::{DetectorSpec, ModelRegistry, ModelSpec, UpsamplerSpec, weight_path};
use image::{Rgb, Rgb32FImage, RgbImage};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Nearest-neighbour upscaler.
pub struct Nearest(pub u32);

impl Network for Nearest {
    fn forward(&mut self, input: &Rgb32FImage) -> Result<Rgb32FImage> {
        let (w, h) = input.dimensions();
        let s = self.0;
        Ok(Rgb32FImage::from_fn(w * s, h * s, |x, y| *input.get_pixel(x / s, y / s)))
    }
}

/// Restorer that paints every crop white.
pub struct Whiten;

impl Network for Whiten {
    fn forward(&mut self, input: &Rgb32FImage) -> Result<Rgb32FImage> {
        Ok(Rgb32FImage::from_pixel(input.width(), input.height(), Rgb([1.0, 1.0, 1.0])))
    }
}

/// Detector returning a fixed list of faces.
pub struct FixedDetector(pub Vec<DetectedFace>);

impl FaceDetector for FixedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>> {
        Ok(self.0.clone())
    }
}

/// Loader handing out fakes and counting every load.
#[derive(Default)]
pub struct FakeLoader {
    /// Faces reported by every detector this loader builds.
    pub faces: Vec<DetectedFace>,
    /// Number of networks loaded so far.
    pub loads: Arc<AtomicUsize>,
    /// Make restorer loading fail.
    pub fail_restorer: bool,
}

impl FakeLoader {
    fn count(&self) {
        self.loads.fetch_add(1, Ordering::SeqCst);
    }
}

impl NetworkLoader for FakeLoader {
    fn load_restorer(&self, spec: &ModelSpec, _: &Path, _: ExecutionTarget) -> Result<Box<dyn Network>> {
        self.count();
        if self.fail_restorer {
            return Err(Error::ModelInit {
                model: spec.weight_file_name.to_string(),
                reason: "corrupt weights".to_string(),
            });
        }
        Ok(Box::new(Whiten))
    }

    fn load_upsampler(&self, spec: &UpsamplerSpec, _: &Path, _: ExecutionTarget) -> Result<Box<dyn Network>> {
        self.count();
        Ok(Box::new(Nearest(spec.scale.factor())))
    }

    fn load_detector(&self, _: &DetectorSpec, _: &Path, _: ExecutionTarget) -> Result<Box<dyn FaceDetector>> {
        self.count();
        Ok(Box::new(FixedDetector(self.faces.clone())))
    }
}

/// Registry whose mirror refuses connections, so only cached weights work.
pub fn offline_registry() -> ModelRegistry {
    ModelRegistry::new("http://127.0.0.1:9")
}

/// Write a placeholder file for every weight the registry knows.
pub fn seed_cache(registry: &ModelRegistry, root: &Path) {
    let mut paths: Vec<_> = registry
        .restoration_specs()
        .iter()
        .map(|s| weight_path(s, root))
        .collect();
    for scale in [crate::registry::UpsampleScale::X2, crate::registry::UpsampleScale::X4] {
        paths.push(weight_path(&registry.upsampler(scale), root));
    }
    paths.push(weight_path(&registry.detector(), root));

    for path in paths {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        std::fs::write(path, b"weights").ok();
    }
}
