//! Model registry, weight resolution and weight download.
//!
//! The registry is a fixed table: every [`ModelVersion`] maps to exactly one
//! [`ModelSpec`]. Download URLs are formed from a mirror base chosen at
//! process start, so the table itself never changes at runtime.

mod installer;
mod resolver;
mod types;

pub use installer::{WeightFetcher, download_file};
pub use resolver::{WeightLocation, resolve, weight_path};
pub use types::{
    Architecture, DetectorSpec, ModelFamily, ModelSpec, ModelVersion, UpsampleScale,
    UpsamplerSpec, WeightSource,
};

use crate::constants::DEFAULT_WEIGHTS_MIRROR;
use crate::error::Result;

/// Static restoration entry, before the mirror URL is applied.
struct RestorerEntry {
    architecture: Architecture,
    channel_multiplier: u32,
    file: &'static str,
}

/// Table lookup for restoration networks.
///
/// A `match` keeps the table exhaustive: adding a version without an entry
/// does not compile.
const fn restorer_entry(version: ModelVersion) -> RestorerEntry {
    match version {
        ModelVersion::V1_2 => RestorerEntry {
            architecture: Architecture::Clean,
            channel_multiplier: 2,
            file: "gfpgan_1.2.onnx",
        },
        ModelVersion::V1_3 => RestorerEntry {
            architecture: Architecture::Clean,
            channel_multiplier: 2,
            file: "gfpgan_1.3.onnx",
        },
        ModelVersion::V1_4 => RestorerEntry {
            architecture: Architecture::Clean,
            channel_multiplier: 2,
            file: "gfpgan_1.4.onnx",
        },
        ModelVersion::RestoreFormer => RestorerEntry {
            architecture: Architecture::RestoreFormer,
            channel_multiplier: 2,
            file: "restoreformer.onnx",
        },
    }
}

const fn upsampler_file(scale: UpsampleScale) -> &'static str {
    match scale {
        UpsampleScale::X2 => "real_esrgan_x2.onnx",
        UpsampleScale::X4 => "real_esrgan_x4.onnx",
    }
}

const DETECTOR_FILE: &str = "retinaface_resnet50.onnx";

/// Registry of every network the service can compose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    mirror_url: String,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHTS_MIRROR)
    }
}

impl ModelRegistry {
    /// Create a registry whose download URLs live under `mirror_url`.
    pub fn new(mirror_url: impl Into<String>) -> Self {
        let mut mirror_url = mirror_url.into();
        while mirror_url.ends_with('/') {
            mirror_url.pop();
        }
        Self { mirror_url }
    }

    /// Base URL used for remote weights.
    pub fn mirror_url(&self) -> &str {
        &self.mirror_url
    }

    /// Look up a restoration model by its version tag.
    pub fn lookup(&self, version: &str) -> Result<ModelSpec> {
        let version: ModelVersion = version.parse()?;
        Ok(self.spec(version))
    }

    /// Restoration model spec for an already-parsed version.
    pub fn spec(&self, version: ModelVersion) -> ModelSpec {
        let entry = restorer_entry(version);
        ModelSpec {
            version,
            architecture: entry.architecture,
            channel_multiplier: entry.channel_multiplier,
            weight_file_name: entry.file,
            remote_url: self.url_for(entry.file),
        }
    }

    /// Every restoration model, oldest first.
    pub fn restoration_specs(&self) -> Vec<ModelSpec> {
        ModelVersion::ALL.iter().map(|v| self.spec(*v)).collect()
    }

    /// Background upsampler spec for a scale.
    pub fn upsampler(&self, scale: UpsampleScale) -> UpsamplerSpec {
        let file = upsampler_file(scale);
        UpsamplerSpec {
            scale,
            weight_file_name: file,
            remote_url: self.url_for(file),
        }
    }

    /// Face detector spec.
    pub fn detector(&self) -> DetectorSpec {
        DetectorSpec {
            weight_file_name: DETECTOR_FILE,
            remote_url: self.url_for(DETECTOR_FILE),
        }
    }

    fn url_for(&self, file: &str) -> String {
        format!("{}/{file}", self.mirror_url)
    }
}
