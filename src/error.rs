//! Error types for reviver.

/// Result type alias for reviver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure class used at the request boundary.
///
/// Each class maps to one stage of the enhancement pipeline, ordered from the
/// cheapest failure (rejected before any model work) to the most wasteful one
/// (inference already spent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: MIME type, undecodable image, missing form fields.
    Validation,
    /// Requested restoration model version is not in the registry.
    UnsupportedVersion,
    /// Weight resolution, download or network construction failed.
    ModelInit,
    /// The numerical pipeline failed.
    Inference,
    /// Persisting the result failed.
    Storage,
    /// Configuration, I/O or other process-level failure.
    Internal,
}

impl ErrorKind {
    /// Stable name used in logs and JSON error bodies.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::UnsupportedVersion => "unsupported_version",
            Self::ModelInit => "model_init",
            Self::Inference => "inference",
            Self::Storage => "storage",
            Self::Internal => "internal",
        }
    }
}

/// Top-level error type for reviver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Input image file does not exist.
    #[error("input file not found: {path}")]
    InputNotFound {
        /// Path that was given.
        path: std::path::PathBuf,
    },

    /// Request rejected before any model work.
    #[error("{reason}")]
    Validation {
        /// Description of what was wrong with the request.
        reason: String,
    },

    /// Version tag not present in the model registry.
    #[error("unsupported model version '{version}'")]
    UnsupportedVersion {
        /// The rejected version tag.
        version: String,
    },

    /// Network weights could not be loaded or the session could not be built.
    #[error("failed to initialize model '{model}': {reason}")]
    ModelInit {
        /// Weight file or model name.
        model: String,
        /// Description of the failure.
        reason: String,
    },

    /// Download of remote weights failed.
    #[error("failed to download from '{url}'")]
    DownloadFailed {
        /// URL that failed.
        url: String,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Inference failed.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Failed to encode the restored image.
    #[error("failed to encode output image")]
    ImageEncode {
        /// Underlying codec error.
        #[source]
        source: image::ImageError,
    },

    /// Result sink rejected or failed the upload.
    #[error("storage failed: {reason}")]
    Storage {
        /// Description of the storage failure.
        reason: String,
    },

    /// HTTP request to the storage service failed.
    #[error("storage request to '{url}' failed")]
    StorageRequest {
        /// URL that failed.
        url: String,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// HTTP server could not be started.
    #[error("server error: {reason}")]
    Server {
        /// Description of the failure.
        reason: String,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Classify this error into the request-boundary taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::InputNotFound { .. } => ErrorKind::Validation,
            Self::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Self::ModelInit { .. } | Self::DownloadFailed { .. } => ErrorKind::ModelInit,
            Self::Inference { .. } | Self::ImageEncode { .. } => ErrorKind::Inference,
            Self::Storage { .. } | Self::StorageRequest { .. } => ErrorKind::Storage,
            Self::Io(_)
            | Self::ConfigDirNotFound
            | Self::ConfigRead { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigWrite { .. }
            | Self::ConfigSerialize { .. }
            | Self::ConfigValidation { .. }
            | Self::Server { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for an inference failure.
    pub fn inference(reason: impl Into<String>) -> Self {
        Self::Inference {
            reason: reason.into(),
        }
    }
}
