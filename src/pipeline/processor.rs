//! End-to-end enhancement: validate, build, infer, encode, store.

use super::cache::EngineCache;
use super::request::EnhancementRequest;
use crate::constants::OUTPUT_JPEG_QUALITY;
use crate::error::{Error, Result};
use crate::identity::{CanonicalId, translate};
use crate::storage::{Locator, ResultSink};
use chrono::{DateTime, Utc};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Pipeline stage a request is in, reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request checks and image decoding.
    Validate,
    /// Engine lookup or construction.
    Build,
    /// Restoration and upscaling.
    Infer,
    /// JPEG encoding.
    Encode,
    /// Identity translation and upload.
    Store,
}

impl Stage {
    /// Stage name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Build => "build",
            Self::Infer => "infer",
            Self::Encode => "encode",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully stored enhancement.
#[derive(Debug, Clone)]
pub struct EnhancementResult {
    /// Encoded JPEG bytes that were stored.
    pub processed_image: Vec<u8>,
    /// Where the stored result can be fetched.
    pub locator: Locator,
    /// Owner the result is stored under.
    pub owner: CanonicalId,
    /// When the result was stored.
    pub created_at: DateTime<Utc>,
}

/// Encode an image as JPEG.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, OUTPUT_JPEG_QUALITY)
        .encode_image(image)
        .map_err(|source| Error::ImageEncode { source })?;
    Ok(bytes)
}

/// Runs enhancement requests against cached engines and a result sink.
#[derive(Clone)]
pub struct Enhancer {
    engines: Arc<EngineCache>,
    sink: Arc<dyn ResultSink>,
    max_upload_bytes: u64,
}

impl Enhancer {
    /// Create an enhancer.
    pub fn new(engines: Arc<EngineCache>, sink: Arc<dyn ResultSink>, max_upload_bytes: u64) -> Self {
        Self {
            engines,
            sink,
            max_upload_bytes,
        }
    }

    /// Engine cache shared by all requests.
    pub fn engines(&self) -> &Arc<EngineCache> {
        &self.engines
    }

    /// Result sink in use.
    pub fn sink(&self) -> &Arc<dyn ResultSink> {
        &self.sink
    }

    /// Process one request to completion.
    ///
    /// Produces either a stored result or an error, never both. Failures
    /// are logged here with the version, token and stage reached.
    pub async fn process(&self, request: EnhancementRequest) -> Result<EnhancementResult> {
        let version = request.version.clone();
        let user_token = request.user_token.clone();
        let mut stage = Stage::Validate;

        let result = self.run(request, &mut stage).await;
        if let Err(e) = &result {
            error!(
                version = %version,
                user_token = %user_token,
                stage = %stage,
                kind = e.kind().as_str(),
                "Enhancement failed: {e}"
            );
        }
        result
    }

    async fn run(&self, request: EnhancementRequest, stage: &mut Stage) -> Result<EnhancementResult> {
        let start = Instant::now();
        let validated = request.validate_blocking(self.max_upload_bytes).await?;
        let (w, h) = validated.image.dimensions();
        info!("Enhancing {}x{} image with {}", w, h, validated.key);

        *stage = Stage::Build;
        let lease = self.engines.acquire(validated.key).await?;

        *stage = Stage::Infer;
        let restored = lease.run(validated.image).await?;

        *stage = Stage::Encode;
        let processed_image = tokio::task::spawn_blocking(move || encode_jpeg(&restored))
            .await
            .map_err(|e| Error::Internal {
                message: format!("encode task failed: {e}"),
            })??;

        *stage = Stage::Store;
        let owner = translate(&validated.user_token);
        let locator = self.sink.store(processed_image.clone(), &owner).await?;

        info!(
            "Stored {} ({} bytes) via {} in {:.2}s",
            locator.key,
            processed_image.len(),
            self.sink.name(),
            start.elapsed().as_secs_f64()
        );

        Ok(EnhancementResult {
            processed_image,
            locator,
            owner,
            created_at: Utc::now(),
        })
    }
}
