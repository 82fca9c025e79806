//! Configuration type definitions.

use crate::constants::{
    DEFAULT_WEIGHTS_MIRROR, MAX_UPLOAD_BYTES, engine_cache, server, storage, timeouts,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Weight cache and download settings.
    pub weights: WeightsConfig,

    /// Inference settings.
    pub inference: InferenceConfig,

    /// Result storage settings.
    pub storage: StorageConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: server::DEFAULT_HOST.to_string(),
            port: server::DEFAULT_PORT,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

/// Weight cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WeightsConfig {
    /// Cache root; defaults to the platform data directory.
    pub dir: Option<PathBuf>,

    /// Base URL every weight file is downloaded from.
    pub mirror_url: String,

    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Overall timeout of one download in seconds.
    pub download_timeout_secs: u64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            mirror_url: DEFAULT_WEIGHTS_MIRROR.to_string(),
            connect_timeout_secs: timeouts::CONNECT_SECS,
            download_timeout_secs: timeouts::DOWNLOAD_SECS,
        }
    }
}

impl WeightsConfig {
    /// Connect timeout.
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Overall download timeout.
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Inference device configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InferenceDevice {
    /// Automatically select (GPU if available, else CPU).
    #[default]
    Auto,
    /// Prefer GPU (CUDA); falls back to CPU with a warning.
    Gpu,
    /// Force CPU inference.
    Cpu,
}

impl std::fmt::Display for InferenceDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Inference settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InferenceConfig {
    /// Device to use for inference.
    pub device: InferenceDevice,

    /// Number of composed engines kept in memory.
    pub engine_cache_capacity: usize,

    /// Inference calls allowed on the device at once.
    pub max_concurrent_inference: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            device: InferenceDevice::Auto,
            engine_cache_capacity: engine_cache::DEFAULT_CAPACITY,
            max_concurrent_inference: engine_cache::DEFAULT_DEVICE_PERMITS,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Write under a local directory.
    #[default]
    Local,
    /// Upload to a Supabase Storage bucket.
    Supabase,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Supabase => write!(f, "supabase"),
        }
    }
}

/// Result storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend results are persisted to.
    pub backend: StorageBackend,

    /// Local output directory; defaults to the platform data directory.
    pub output_dir: Option<PathBuf>,

    /// Base URL local results are served under; empty for `file://` URLs.
    pub public_base_url: String,

    /// Supabase project URL.
    pub supabase_url: String,

    /// Supabase service key.
    pub supabase_key: String,

    /// Supabase bucket.
    pub bucket: String,

    /// Overall timeout of one upload in seconds.
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            output_dir: None,
            public_base_url: String::new(),
            supabase_url: String::new(),
            supabase_key: String::new(),
            bucket: storage::DEFAULT_BUCKET.to_string(),
            request_timeout_secs: timeouts::STORAGE_SECS,
        }
    }
}

impl StorageConfig {
    /// Overall upload timeout.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
