//! Shared fixtures: deterministic networks, a counting sink and a seeded
//! weight cache.

#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use image::{ImageFormat, Rgb, Rgb32FImage, RgbImage};
use reviver::identity::CanonicalId;
use reviver::inference::{
    DetectedFace, EngineBuilder, ExecutionTarget, FaceDetector, Network, NetworkLoader,
};
use reviver::pipeline::{EngineCache, Enhancer};
use reviver::registry::{
    DetectorSpec, ModelRegistry, ModelSpec, UpsampleScale, UpsamplerSpec, WeightFetcher,
    weight_path,
};
use reviver::storage::{LocalDirSink, Locator, ResultSink};
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Nearest-neighbour super-resolution.
pub struct Nearest(pub u32);

impl Network for Nearest {
    fn forward(&mut self, input: &Rgb32FImage) -> reviver::Result<Rgb32FImage> {
        let (w, h) = input.dimensions();
        let s = self.0;
        Ok(Rgb32FImage::from_fn(w * s, h * s, |x, y| *input.get_pixel(x / s, y / s)))
    }
}

/// Restorer returning its input unchanged.
pub struct Passthrough;

impl Network for Passthrough {
    fn forward(&mut self, input: &Rgb32FImage) -> reviver::Result<Rgb32FImage> {
        Ok(input.clone())
    }
}

/// Detector that never finds a face.
pub struct NoFaces;

impl FaceDetector for NoFaces {
    fn detect(&mut self, _image: &RgbImage) -> reviver::Result<Vec<DetectedFace>> {
        Ok(Vec::new())
    }
}

/// Loader that counts every network it builds.
#[derive(Default)]
pub struct CountingLoader {
    pub loads: AtomicUsize,
}

impl CountingLoader {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl NetworkLoader for CountingLoader {
    fn load_restorer(&self, _: &ModelSpec, _: &Path, _: ExecutionTarget) -> reviver::Result<Box<dyn Network>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Passthrough))
    }

    fn load_upsampler(
        &self,
        spec: &UpsamplerSpec,
        _: &Path,
        _: ExecutionTarget,
    ) -> reviver::Result<Box<dyn Network>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Nearest(spec.scale.factor())))
    }

    fn load_detector(&self, _: &DetectorSpec, _: &Path, _: ExecutionTarget) -> reviver::Result<Box<dyn FaceDetector>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(NoFaces))
    }
}

/// Local sink that counts store calls.
pub struct CountingSink {
    inner: LocalDirSink,
    pub stores: AtomicUsize,
}

impl CountingSink {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalDirSink::new(root, None),
            stores: AtomicUsize::new(0),
        }
    }

    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultSink for CountingSink {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn store(&self, bytes: Vec<u8>, owner: &CanonicalId) -> reviver::Result<Locator> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(bytes, owner).await
    }
}

/// Registry whose mirror refuses connections.
pub fn offline_registry() -> ModelRegistry {
    ModelRegistry::new("http://127.0.0.1:9")
}

/// Write a placeholder for every weight file the registry knows.
pub fn seed_weights(registry: &ModelRegistry, root: &Path) {
    let mut paths: Vec<_> = registry
        .restoration_specs()
        .iter()
        .map(|s| weight_path(s, root))
        .collect();
    paths.push(weight_path(&registry.upsampler(UpsampleScale::X2), root));
    paths.push(weight_path(&registry.upsampler(UpsampleScale::X4), root));
    paths.push(weight_path(&registry.detector(), root));
    for path in paths {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"weights").unwrap();
    }
}

/// A pipeline wired to fakes, with handles on what it did.
pub struct Harness {
    pub enhancer: Enhancer,
    pub engines: Arc<EngineCache>,
    pub loader: Arc<CountingLoader>,
    pub sink: Arc<CountingSink>,
    pub weights: tempfile::TempDir,
    pub output: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let weights = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let registry = offline_registry();
        seed_weights(&registry, weights.path());

        let fetcher = WeightFetcher::new(weights.path(), Duration::from_secs(1), Duration::from_secs(2)).unwrap();
        let loader = Arc::new(CountingLoader::default());
        let builder = EngineBuilder::new(
            registry,
            fetcher,
            Arc::clone(&loader) as Arc<dyn NetworkLoader>,
            ExecutionTarget::CPU,
        );
        let engines = Arc::new(EngineCache::new(builder, NonZeroUsize::new(4).unwrap(), 1));
        let sink = Arc::new(CountingSink::new(output.path()));
        let enhancer = Enhancer::new(
            Arc::clone(&engines),
            Arc::clone(&sink) as Arc<dyn ResultSink>,
            50 * 1024 * 1024,
        );

        Self {
            enhancer,
            engines,
            loader,
            sink,
            weights,
            output,
        }
    }
}

/// Encode a flat-color image.
pub fn encoded(w: u32, h: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
        .write_to(&mut buf, format)
        .unwrap();
    buf.into_inner()
}
