//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "reviver";

/// Default restoration model version tag ("latest stable").
pub const DEFAULT_VERSION: &str = "1.4";

/// Default overall upscale factor.
pub const DEFAULT_UPSCALE: u32 = 4;

/// Largest accepted overall upscale factor.
pub const MAX_UPSCALE: u32 = 8;

/// Largest accepted upload in bytes (50 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Largest accepted decoded input, in pixels (32 MP).
///
/// Compressed uploads under the byte limit can still decode to huge
/// frames, so the pixel count is capped independently.
pub const MAX_INPUT_PIXELS: u64 = 32_000_000;

/// Largest frame produced during enhancement, in pixels (64 MP).
///
/// Bounds both the final output and the native-scale background frame.
pub const MAX_OUTPUT_PIXELS: u64 = 64_000_000;

/// JPEG quality used for encoded results.
pub const OUTPUT_JPEG_QUALITY: u8 = 95;

/// Prefix of stored result objects.
pub const OUTPUT_PREFIX: &str = "restored_";

/// Extension of stored result objects.
pub const OUTPUT_EXTENSION: &str = "jpg";

/// Default mirror that hosts the ONNX exports of every registry entry.
pub const DEFAULT_WEIGHTS_MIRROR: &str =
    "https://github.com/facefusion/facefusion-assets/releases/download/models-3.0.0";

/// Background upsampler tiling parameters.
///
/// Full-frame 4x super-resolution does not fit in memory for large inputs,
/// so inference runs on fixed-size overlapping patches.
pub mod tiling {
    /// Tile edge length in input pixels.
    pub const TILE_SIZE: u32 = 400;
    /// Overlap added around each tile on every side.
    pub const TILE_PADDING: u32 = 10;
    /// Reflect padding added to the right/bottom edge before tiling.
    pub const PRE_PAD: u32 = 0;
}

/// Face restoration constants.
pub mod face {
    /// Edge length of aligned face crops fed to the restoration network.
    pub const CROP_SIZE: u32 = 512;

    /// FFHQ five-point landmark template for a 512x512 crop
    /// (left eye, right eye, nose, left mouth corner, right mouth corner).
    pub const TEMPLATE_512: [[f32; 2]; 5] = [
        [192.981_38, 239.947_08],
        [318.902_77, 240.193_6],
        [256.634_16, 314.019_35],
        [201.261_17, 371.410_43],
        [313.089_05, 371.151_18],
    ];

    /// Minimum detector confidence for a face to be restored.
    pub const DETECTION_THRESHOLD: f32 = 0.97;

    /// Faces whose eyes are closer than this many pixels are skipped.
    pub const MIN_EYE_DISTANCE: f32 = 5.0;

    /// Longest edge of the image fed to the face detector.
    pub const DETECTION_INPUT_SIZE: u32 = 640;

    /// Border fill for pixels that fall outside the source during alignment.
    pub const BORDER_VALUE: [f32; 3] = [132.0 / 255.0, 133.0 / 255.0, 135.0 / 255.0];

    /// Pixels of the crop border excluded from paste-back.
    pub const PASTE_ERODE: f32 = 2.0;

    /// Width of the linear feather at the crop border, in crop pixels.
    pub const PASTE_FEATHER: f32 = 25.0;
}

/// Identity translation constants.
pub mod identity {
    /// Length of a hyphenated canonical identifier.
    pub const CANONICAL_LEN: usize = 36;
    /// Separator used by the canonical textual format.
    pub const SEPARATOR: char = '-';
}

/// Network timeouts.
pub mod timeouts {
    /// Connect timeout for weight downloads and storage uploads, in seconds.
    pub const CONNECT_SECS: u64 = 30;
    /// Overall timeout for a single weight download, in seconds.
    pub const DOWNLOAD_SECS: u64 = 300;
    /// Overall timeout for a single storage upload, in seconds.
    pub const STORAGE_SECS: u64 = 60;
}

/// Server defaults.
pub mod server {
    /// Default bind host.
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    /// Default bind port.
    pub const DEFAULT_PORT: u16 = 5000;
    /// URL path segment under which local results are served.
    pub const STATIC_PREFIX: &str = "static";
}

/// Engine cache defaults.
pub mod engine_cache {
    /// Number of composed engines kept alive.
    pub const DEFAULT_CAPACITY: usize = 4;
    /// Number of inference calls allowed on the compute device at once.
    pub const DEFAULT_DEVICE_PERMITS: usize = 1;
}

/// Storage defaults.
pub mod storage {
    /// Default Supabase bucket for processed images.
    pub const DEFAULT_BUCKET: &str = "processed-images";
    /// Directory name for local results.
    pub const OUTPUT_DIR_NAME: &str = "output_images";
    /// Cache-Control max-age sent with uploads, in seconds.
    pub const CACHE_CONTROL_SECS: u32 = 3600;
}
