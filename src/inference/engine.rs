//! Restoration engine builder and executor.
//!
//! An engine is the composition of one restoration network, the face
//! detector used for alignment, and an optional background upsampler. It is
//! built once per configuration key and then executed against decoded
//! images.

use super::device::ExecutionTarget;
use super::face::{AlignedFace, select_faces};
use super::network::{FaceDetector, Network, NetworkLoader};
use super::upsampler::{BackgroundChoice, BackgroundUpsampler, UpsamplerConfig, UpsamplerFactory};
use super::{to_rgb8, to_rgb32f};
use crate::constants::face::CROP_SIZE;
use crate::error::{Error, Result};
use crate::registry::{
    ModelRegistry, ModelSpec, ModelVersion, UpsampleScale, WeightFetcher, WeightLocation, resolve,
};
use image::imageops::{self, FilterType};
use image::{Rgb32FImage, RgbImage};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Full configuration tuple an engine is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineKey {
    /// Restoration model version.
    pub version: ModelVersion,
    /// Overall output upscale factor.
    pub upscale: u32,
    /// Background upsampler choice.
    pub background: BackgroundChoice,
    /// Native scale of the background upsampler.
    pub background_scale: UpsampleScale,
}

impl EngineKey {
    /// Build a key.
    ///
    /// Without a background upsampler the scale has no effect, so it is
    /// normalized to keep equivalent requests on one engine.
    pub fn new(
        version: ModelVersion,
        upscale: u32,
        background: BackgroundChoice,
        background_scale: UpsampleScale,
    ) -> Self {
        let background_scale = match background {
            BackgroundChoice::None => UpsampleScale::default(),
            BackgroundChoice::RealEsrgan => background_scale,
        };
        Self {
            version,
            upscale,
            background,
            background_scale,
        }
    }
}

impl fmt::Display for EngineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} x{} bg={}", self.version, self.upscale, self.background)?;
        if self.background != BackgroundChoice::None {
            write!(f, "/{}", self.background_scale)?;
        }
        Ok(())
    }
}

/// Everything one engine invocation produces.
#[derive(Debug, Clone)]
pub struct RestorationOutput {
    /// Aligned 512x512 face crops taken from the input.
    pub cropped_faces: Vec<RgbImage>,
    /// The same crops after restoration.
    pub restored_faces: Vec<RgbImage>,
    /// Upscaled frame with restored faces pasted back.
    pub restored_image: RgbImage,
}

/// A composed, ready-to-run restoration engine.
pub struct RestorationEngine {
    spec: ModelSpec,
    location: WeightLocation,
    upscale: u32,
    restorer: Box<dyn Network>,
    detector: Box<dyn FaceDetector>,
    background: Option<BackgroundUpsampler>,
}

impl fmt::Debug for RestorationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestorationEngine")
            .field("spec", &self.spec)
            .field("location", &self.location)
            .field("upscale", &self.upscale)
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}

impl RestorationEngine {
    /// Restoration model this engine runs.
    pub const fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Where the restoration weights were resolved to when built.
    pub const fn location(&self) -> &WeightLocation {
        &self.location
    }

    /// Overall upscale factor.
    pub const fn upscale(&self) -> u32 {
        self.upscale
    }

    /// Background upsampler settings, if one is attached.
    pub fn upsampler_config(&self) -> Option<&UpsamplerConfig> {
        self.background.as_ref().map(BackgroundUpsampler::config)
    }

    /// Detect, align, restore and paste back every face in `image`.
    pub fn enhance(&mut self, image: &RgbImage) -> Result<RestorationOutput> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(Error::inference("cannot restore an empty image"));
        }

        let faces = select_faces(&self.detector.detect(image)?);
        debug!("{} face(s) selected for restoration", faces.len());

        let source = to_rgb32f(image);
        let mut aligned = Vec::with_capacity(faces.len());
        let mut cropped = Vec::with_capacity(faces.len());
        let mut restored = Vec::with_capacity(faces.len());

        for face in &faces {
            let alignment = AlignedFace::new(face)?;
            let crop = alignment.crop(&source)?;
            let output = self.restorer.forward(&crop)?;
            if output.dimensions() != (CROP_SIZE, CROP_SIZE) {
                return Err(Error::inference(format!(
                    "restorer returned {:?}, expected {CROP_SIZE}x{CROP_SIZE}",
                    output.dimensions()
                )));
            }
            aligned.push(alignment);
            cropped.push(crop);
            restored.push(output);
        }

        let mut frame = self.background_frame(&source)?;
        for (alignment, face) in aligned.iter().zip(&restored) {
            alignment.paste(&mut frame, face, self.upscale)?;
        }

        Ok(RestorationOutput {
            cropped_faces: cropped.iter().map(to_rgb8).collect(),
            restored_faces: restored.iter().map(to_rgb8).collect(),
            restored_image: to_rgb8(&frame),
        })
    }

    fn background_frame(&mut self, source: &Rgb32FImage) -> Result<Rgb32FImage> {
        let upscale = self.upscale;
        match self.background.as_mut() {
            Some(upsampler) => upsampler.upscale_frame(source, upscale),
            None if upscale == 1 => Ok(source.clone()),
            None => {
                let (w, h) = source.dimensions();
                Ok(imageops::resize(source, w * upscale, h * upscale, FilterType::Lanczos3))
            }
        }
    }
}

/// Run `engine` on `image` with paste-back and return the full frame.
pub fn execute(engine: &mut RestorationEngine, image: &RgbImage) -> Result<RgbImage> {
    let start = Instant::now();
    let output = engine.enhance(image)?;
    info!(
        "Restored {} face(s) with {} in {:.2}s ({}x{} -> {}x{})",
        output.restored_faces.len(),
        engine.spec.version,
        start.elapsed().as_secs_f64(),
        image.width(),
        image.height(),
        output.restored_image.width(),
        output.restored_image.height()
    );
    Ok(output.restored_image)
}

/// Composes restoration engines from registry entries.
#[derive(Clone)]
pub struct EngineBuilder {
    registry: ModelRegistry,
    fetcher: WeightFetcher,
    loader: Arc<dyn NetworkLoader>,
    target: ExecutionTarget,
    upsamplers: UpsamplerFactory,
}

impl EngineBuilder {
    /// Create a builder.
    pub fn new(
        registry: ModelRegistry,
        fetcher: WeightFetcher,
        loader: Arc<dyn NetworkLoader>,
        target: ExecutionTarget,
    ) -> Self {
        let upsamplers = UpsamplerFactory::new(
            registry.clone(),
            fetcher.clone(),
            Arc::clone(&loader),
            target,
        );
        Self {
            registry,
            fetcher,
            loader,
            target,
            upsamplers,
        }
    }

    /// Registry the builder looks versions up in.
    pub const fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Factory for background upsamplers.
    pub const fn upsamplers(&self) -> &UpsamplerFactory {
        &self.upsamplers
    }

    /// Execution target networks are loaded for.
    pub const fn target(&self) -> ExecutionTarget {
        self.target
    }

    /// Compose an engine for `version` around an already built upsampler.
    pub async fn build(
        &self,
        version: &str,
        upscale: u32,
        upsampler: Option<BackgroundUpsampler>,
    ) -> Result<RestorationEngine> {
        let spec = self.registry.lookup(version)?;
        let location = resolve(&spec, self.fetcher.cache_root());
        let weights = self.fetcher.materialize(&spec, &location).await?;

        let detector_spec = self.registry.detector();
        let detector_location = resolve(&detector_spec, self.fetcher.cache_root());
        let detector_weights = self
            .fetcher
            .materialize(&detector_spec, &detector_location)
            .await?;

        let loader = Arc::clone(&self.loader);
        let target = self.target;
        let load_spec = spec.clone();
        let (restorer, detector) = tokio::task::spawn_blocking(move || -> Result<_> {
            let restorer = loader.load_restorer(&load_spec, &weights, target)?;
            let detector = loader.load_detector(&detector_spec, &detector_weights, target)?;
            Ok((restorer, detector))
        })
        .await
        .map_err(|e| Error::ModelInit {
            model: spec.weight_file_name.to_string(),
            reason: format!("loader task failed: {e}"),
        })??;

        info!(
            "Engine ready: {} ({}, x{}), upscale {}, background {}",
            spec.version,
            spec.architecture,
            spec.channel_multiplier,
            upscale,
            upsampler
                .as_ref()
                .map_or_else(|| "none".to_string(), |u| u.config().scale.to_string())
        );

        Ok(RestorationEngine {
            spec,
            location,
            upscale,
            restorer,
            detector,
            background: upsampler,
        })
    }

    /// Build the background upsampler and the engine for a full key.
    pub async fn build_for(&self, key: &EngineKey) -> Result<RestorationEngine> {
        let upsampler = self.upsamplers.build(key.background, key.background_scale).await?;
        self.build(key.version.as_str(), key.upscale, upsampler).await
    }
}
