//! Background upsampler factory.

use super::device::ExecutionTarget;
use super::network::{Network, NetworkLoader};
use super::tile::{TileConfig, upsample_tiled};
use super::{to_rgb8, to_rgb32f};
use crate::error::{Error, Result};
use crate::registry::{ModelRegistry, UpsampleScale, WeightFetcher, resolve};
use image::{Rgb32FImage, RgbImage};
use image::imageops::{self, FilterType};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Which model enhances the non-face background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackgroundChoice {
    /// Plain resize, no background model.
    #[default]
    None,
    /// Real-ESRGAN super-resolution.
    RealEsrgan,
}

impl BackgroundChoice {
    /// Name as accepted on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RealEsrgan => "realesrgan",
        }
    }
}

impl fmt::Display for BackgroundChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackgroundChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "realesrgan" => Ok(Self::RealEsrgan),
            other => Err(Error::validation(format!(
                "unknown background upsampler '{other}', expected none or realesrgan"
            ))),
        }
    }
}

/// Settings of an enabled background upsampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsamplerConfig {
    /// Whether background enhancement runs at all.
    pub enabled: bool,
    /// Native scale of the network.
    pub scale: UpsampleScale,
    /// Tile edge length; 0 disables tiling.
    pub tile_size: u32,
    /// Overlap padding per tile side.
    pub tile_padding: u32,
    /// Reflect padding applied once to the whole frame.
    pub pre_pad: u32,
    /// Run in FP16; only ever true on accelerated hardware.
    pub use_half_precision: bool,
}

impl UpsamplerConfig {
    /// Fixed tiling configuration for a scale on a target.
    pub fn new(scale: UpsampleScale, target: ExecutionTarget) -> Self {
        let tiles = TileConfig::default();
        Self {
            enabled: true,
            scale,
            tile_size: tiles.tile_size,
            tile_padding: tiles.tile_padding,
            pre_pad: tiles.pre_pad,
            use_half_precision: target.half_precision(),
        }
    }

    /// Tiling part of the configuration.
    pub const fn tiles(&self) -> TileConfig {
        TileConfig {
            tile_size: self.tile_size,
            tile_padding: self.tile_padding,
            pre_pad: self.pre_pad,
        }
    }
}

/// A loaded super-resolution network with its tiling parameters.
pub struct BackgroundUpsampler {
    config: UpsamplerConfig,
    network: Box<dyn Network>,
}

impl fmt::Debug for BackgroundUpsampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundUpsampler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BackgroundUpsampler {
    /// Wrap an already loaded network.
    pub fn new(config: UpsamplerConfig, network: Box<dyn Network>) -> Self {
        Self { config, network }
    }

    /// Configuration this upsampler was built with.
    pub const fn config(&self) -> &UpsamplerConfig {
        &self.config
    }

    /// Upscale `image` by `outscale`.
    ///
    /// The network always runs at its native scale; a different `outscale`
    /// is reached with a Lanczos resize of the network output.
    pub fn enhance(&mut self, image: &RgbImage, outscale: u32) -> Result<RgbImage> {
        Ok(to_rgb8(&self.upscale_frame(&to_rgb32f(image), outscale)?))
    }

    pub(crate) fn upscale_frame(&mut self, image: &Rgb32FImage, outscale: u32) -> Result<Rgb32FImage> {
        let native = self.config.scale.factor();
        let upscaled = upsample_tiled(self.network.as_mut(), image, native, &self.config.tiles())?;
        if outscale == native {
            return Ok(upscaled);
        }
        let (w, h) = image.dimensions();
        debug!("Resizing x{} background output to x{}", native, outscale);
        Ok(imageops::resize(&upscaled, w * outscale, h * outscale, FilterType::Lanczos3))
    }
}

/// Builds optional background upsamplers.
#[derive(Clone)]
pub struct UpsamplerFactory {
    registry: ModelRegistry,
    fetcher: WeightFetcher,
    loader: Arc<dyn NetworkLoader>,
    target: ExecutionTarget,
}

impl UpsamplerFactory {
    /// Create a factory.
    pub fn new(
        registry: ModelRegistry,
        fetcher: WeightFetcher,
        loader: Arc<dyn NetworkLoader>,
        target: ExecutionTarget,
    ) -> Self {
        Self {
            registry,
            fetcher,
            loader,
            target,
        }
    }

    /// Build the upsampler for `choice`, or `None` when disabled.
    ///
    /// Weight download and network construction failures are reported as
    /// model initialization errors.
    pub async fn build(
        &self,
        choice: BackgroundChoice,
        scale: UpsampleScale,
    ) -> Result<Option<BackgroundUpsampler>> {
        if choice == BackgroundChoice::None {
            return Ok(None);
        }

        let spec = self.registry.upsampler(scale);
        let location = resolve(&spec, self.fetcher.cache_root());
        let weights = self.fetcher.materialize(&spec, &location).await?;

        let config = UpsamplerConfig::new(scale, self.target);
        let loader = Arc::clone(&self.loader);
        let target = self.target;
        let network = tokio::task::spawn_blocking(move || loader.load_upsampler(&spec, &weights, target))
            .await
            .map_err(|e| Error::ModelInit {
                model: format!("realesrgan {scale}"),
                reason: format!("loader task failed: {e}"),
            })??;

        info!(
            "Background upsampler ready: realesrgan {} (tile {}, pad {})",
            scale, config.tile_size, config.tile_padding
        );
        Ok(Some(BackgroundUpsampler::new(config, network)))
    }
}
