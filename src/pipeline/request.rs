//! Enhancement request validation.

use crate::constants::{DEFAULT_UPSCALE, DEFAULT_VERSION, MAX_INPUT_PIXELS, MAX_OUTPUT_PIXELS, MAX_UPSCALE};
use crate::error::{Error, Result};
use crate::inference::{BackgroundChoice, EngineKey};
use crate::registry::{ModelVersion, UpsampleScale};
use image::{ImageError, ImageReader, Limits, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Size caps applied while validating a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Largest accepted decoded input in pixels.
    pub max_input_pixels: u64,
    /// Largest frame enhancement may produce, in pixels.
    pub max_output_pixels: u64,
}

impl RequestLimits {
    /// Byte cap as configured, pixel caps at their defaults.
    pub const fn new(max_upload_bytes: u64) -> Self {
        Self {
            max_upload_bytes,
            max_input_pixels: MAX_INPUT_PIXELS,
            max_output_pixels: MAX_OUTPUT_PIXELS,
        }
    }

    /// Decoder allocation cap: the input pixel cap at the widest sample
    /// layout (RGBA, 16 bits per channel).
    fn decoder_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_input_pixels.saturating_mul(8));
        limits
    }
}

/// An enhancement request as received, before any validation.
#[derive(Debug, Clone)]
pub struct EnhancementRequest {
    /// Raw uploaded bytes.
    pub image_bytes: Vec<u8>,
    /// Declared MIME type of the upload.
    pub content_type: Option<String>,
    /// Token issued by the external identity provider.
    pub user_token: String,
    /// Restoration model version tag.
    pub version: String,
    /// Overall upscale factor.
    pub upscale: u32,
    /// Background upsampler choice.
    pub background: BackgroundChoice,
    /// Background upsampler native scale.
    pub background_scale: UpsampleScale,
}

impl EnhancementRequest {
    /// Request with default model settings.
    pub fn new(image_bytes: Vec<u8>, content_type: Option<String>, user_token: impl Into<String>) -> Self {
        Self {
            image_bytes,
            content_type,
            user_token: user_token.into(),
            version: DEFAULT_VERSION.to_string(),
            upscale: DEFAULT_UPSCALE,
            background: BackgroundChoice::None,
            background_scale: UpsampleScale::X4,
        }
    }

    /// Set the model version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the overall upscale factor.
    #[must_use]
    pub const fn with_upscale(mut self, upscale: u32) -> Self {
        self.upscale = upscale;
        self
    }

    /// Set the background upsampler.
    #[must_use]
    pub const fn with_background(mut self, background: BackgroundChoice, scale: UpsampleScale) -> Self {
        self.background = background;
        self.background_scale = scale;
        self
    }

    /// Check everything that can be checked without model work and decode
    /// the image.
    ///
    /// Cheap checks run first; decoding is last because it is the only
    /// expensive one. Pixel caps are the defaults from [`RequestLimits::new`].
    pub fn validate(self, max_upload_bytes: u64) -> Result<ValidatedRequest> {
        self.validate_within(&RequestLimits::new(max_upload_bytes))
    }

    /// [`validate`](Self::validate) on the blocking pool.
    ///
    /// Decoding a large upload takes long enough to stall other requests
    /// sharing the async worker.
    pub async fn validate_blocking(self, max_upload_bytes: u64) -> Result<ValidatedRequest> {
        tokio::task::spawn_blocking(move || self.validate(max_upload_bytes))
            .await
            .map_err(|e| Error::Internal {
                message: format!("validation task failed: {e}"),
            })?
    }

    /// [`validate`](Self::validate) against explicit limits.
    pub fn validate_within(self, limits: &RequestLimits) -> Result<ValidatedRequest> {
        let max_upload_bytes = limits.max_upload_bytes;
        let is_image = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"));
        if !is_image {
            return Err(Error::validation("File must be an image"));
        }

        if self.image_bytes.len() as u64 > max_upload_bytes {
            return Err(Error::validation(format!(
                "Image exceeds the {max_upload_bytes} byte upload limit"
            )));
        }

        let user_token = self.user_token.trim();
        if user_token.is_empty() {
            return Err(Error::validation("user_id is required"));
        }

        if !(1..=MAX_UPSCALE).contains(&self.upscale) {
            return Err(Error::validation(format!(
                "upscale must be between 1 and {MAX_UPSCALE}, got {}",
                self.upscale
            )));
        }

        let version: ModelVersion = self.version.parse()?;

        let image = decode(&self.image_bytes, limits)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::validation("Invalid image file"));
        }

        let pixels = u64::from(width) * u64::from(height);
        if pixels > limits.max_input_pixels {
            return Err(too_large(width, height, limits.max_input_pixels));
        }

        // The background model runs at its native scale before the final
        // resize, so that frame can be larger than the output.
        let widest_scale = match self.background {
            BackgroundChoice::RealEsrgan => self.upscale.max(self.background_scale.factor()),
            BackgroundChoice::None => self.upscale,
        };
        let scaled = pixels.saturating_mul(u64::from(widest_scale).pow(2));
        if scaled > limits.max_output_pixels {
            return Err(Error::validation(format!(
                "{width}x{height} at {widest_scale}x exceeds the {} pixel output limit",
                limits.max_output_pixels
            )));
        }

        Ok(ValidatedRequest {
            key: EngineKey::new(version, self.upscale, self.background, self.background_scale),
            user_token: user_token.to_string(),
            image,
        })
    }
}

fn decode(bytes: &[u8], limits: &RequestLimits) -> Result<RgbImage> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| {
            debug!("Format sniffing failed: {e}");
            Error::validation("Invalid image file")
        })?;
    reader.limits(limits.decoder_limits());
    match reader.decode() {
        Ok(image) => Ok(image.to_rgb8()),
        Err(ImageError::Limits(e)) => {
            debug!("Decode refused: {e}");
            Err(Error::validation(format!(
                "Image exceeds the {} pixel input limit",
                limits.max_input_pixels
            )))
        }
        Err(e) => {
            debug!("Decode failed: {e}");
            Err(Error::validation("Invalid image file"))
        }
    }
}

fn too_large(width: u32, height: u32, max_pixels: u64) -> Error {
    Error::validation(format!(
        "{width}x{height} image exceeds the {max_pixels} pixel input limit"
    ))
}

/// A request that passed validation, with its image decoded.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Engine configuration the request needs.
    pub key: EngineKey,
    /// Trimmed identity token.
    pub user_token: String,
    /// Decoded RGB image.
    pub image: RgbImage,
}
