//! Data structures for the model registry.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Supported restoration model version tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelVersion {
    /// GFPGAN 1.2 (clean architecture, no colorization).
    V1_2,
    /// GFPGAN 1.3.
    V1_3,
    /// GFPGAN 1.4.
    #[default]
    V1_4,
    /// `RestoreFormer`.
    RestoreFormer,
}

impl ModelVersion {
    /// Every supported version, oldest first.
    pub const ALL: [Self; 4] = [Self::V1_2, Self::V1_3, Self::V1_4, Self::RestoreFormer];

    /// Tag as accepted on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1_2 => "1.2",
            Self::V1_3 => "1.3",
            Self::V1_4 => "1.4",
            Self::RestoreFormer => "RestoreFormer",
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| Error::UnsupportedVersion {
                version: s.to_string(),
            })
    }
}

/// Restoration network architecture family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// GFPGAN "clean" generator (no custom CUDA ops).
    Clean,
    /// `RestoreFormer` transformer-based restorer.
    RestoreFormer,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::RestoreFormer => write!(f, "restore-former"),
        }
    }
}

/// Background super-resolution scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpsampleScale {
    /// 2x network.
    X2,
    /// 4x network.
    #[default]
    X4,
}

impl UpsampleScale {
    /// Integer scale factor.
    pub const fn factor(self) -> u32 {
        match self {
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }
}

impl fmt::Display for UpsampleScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor())
    }
}

impl FromStr for UpsampleScale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x2" | "2" => Ok(Self::X2),
            "x4" | "4" => Ok(Self::X4),
            other => Err(Error::validation(format!(
                "background upsampler scale must be x2 or x4, got '{other}'"
            ))),
        }
    }
}

/// Weight cache subdirectory a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    /// Face restoration networks.
    Gfpgan,
    /// Background super-resolution networks.
    RealEsrgan,
    /// Face detection networks.
    Facelib,
}

impl ModelFamily {
    /// Every family, in cache layout order.
    pub const ALL: [Self; 3] = [Self::Gfpgan, Self::RealEsrgan, Self::Facelib];

    /// Directory name under the weight cache root.
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Gfpgan => "gfpgan",
            Self::RealEsrgan => "realesrgan",
            Self::Facelib => "facelib",
        }
    }
}

/// Anything whose weights can be resolved from the local cache or a remote URL.
pub trait WeightSource {
    /// Cache family directory.
    fn family(&self) -> ModelFamily;
    /// File name inside the family directory.
    fn weight_file_name(&self) -> &str;
    /// Canonical download URL.
    fn remote_url(&self) -> &str;
}

/// Immutable description of a restoration model version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Version tag.
    pub version: ModelVersion,
    /// Architecture family.
    pub architecture: Architecture,
    /// Generator channel multiplier.
    pub channel_multiplier: u32,
    /// Weight file name in the cache.
    pub weight_file_name: &'static str,
    /// Canonical download URL.
    pub remote_url: String,
}

impl WeightSource for ModelSpec {
    fn family(&self) -> ModelFamily {
        ModelFamily::Gfpgan
    }

    fn weight_file_name(&self) -> &str {
        self.weight_file_name
    }

    fn remote_url(&self) -> &str {
        &self.remote_url
    }
}

/// Immutable description of a background super-resolution network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsamplerSpec {
    /// Native network scale.
    pub scale: UpsampleScale,
    /// Weight file name in the cache.
    pub weight_file_name: &'static str,
    /// Canonical download URL.
    pub remote_url: String,
}

impl WeightSource for UpsamplerSpec {
    fn family(&self) -> ModelFamily {
        ModelFamily::RealEsrgan
    }

    fn weight_file_name(&self) -> &str {
        self.weight_file_name
    }

    fn remote_url(&self) -> &str {
        &self.remote_url
    }
}

/// Immutable description of the face detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorSpec {
    /// Weight file name in the cache.
    pub weight_file_name: &'static str,
    /// Canonical download URL.
    pub remote_url: String,
}

impl WeightSource for DetectorSpec {
    fn family(&self) -> ModelFamily {
        ModelFamily::Facelib
    }

    fn weight_file_name(&self) -> &str {
        self.weight_file_name
    }

    fn remote_url(&self) -> &str {
        &self.remote_url
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_version_round_trips_through_tag() {
        for version in ModelVersion::ALL {
            assert_eq!(version.as_str().parse::<ModelVersion>().unwrap(), version);
        }
    }

    #[test]
    fn test_version_parse_is_case_insensitive() {
        assert_eq!(
            "restoreformer".parse::<ModelVersion>().unwrap(),
            ModelVersion::RestoreFormer
        );
        assert_eq!(" 1.3 ".parse::<ModelVersion>().unwrap(), ModelVersion::V1_3);
    }

    #[test]
    fn test_unknown_version_is_unsupported() {
        let err = "9.9".parse::<ModelVersion>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { ref version } if version == "9.9"));
    }

    #[test]
    fn test_default_version_is_latest_stable() {
        assert_eq!(ModelVersion::default(), ModelVersion::V1_4);
    }

    #[test]
    fn test_upsample_scale_parse() {
        assert_eq!("x2".parse::<UpsampleScale>().unwrap(), UpsampleScale::X2);
        assert_eq!("X4".parse::<UpsampleScale>().unwrap(), UpsampleScale::X4);
        assert_eq!("4".parse::<UpsampleScale>().unwrap(), UpsampleScale::X4);
        assert!("x3".parse::<UpsampleScale>().is_err());
        assert_eq!(UpsampleScale::X2.to_string(), "x2");
    }

    #[test]
    fn test_family_dir_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            ModelFamily::ALL.iter().map(|f| f.dir_name()).collect();
        assert_eq!(names.len(), ModelFamily::ALL.len());
    }
}
