//! Local single-image enhancement.

use super::EnhanceArgs;
use crate::constants::{DEFAULT_UPSCALE, DEFAULT_VERSION, OUTPUT_EXTENSION};
use crate::error::{Error, Result};
use crate::pipeline::{EnhancementRequest, encode_jpeg};
use crate::runtime::Runtime;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Token used for local runs; nothing is stored under it.
const LOCAL_USER: &str = "local";

/// Default output path: `<stem>_restored.jpg` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    input.with_file_name(format!("{stem}_restored.{OUTPUT_EXTENSION}"))
}

/// Run the full pipeline on one file and write the JPEG result.
///
/// Storage is bypassed; the result goes straight to disk.
pub async fn enhance_file(runtime: &Runtime, args: &EnhanceArgs) -> Result<PathBuf> {
    let start = Instant::now();
    if !args.input.is_file() {
        return Err(Error::InputNotFound {
            path: args.input.clone(),
        });
    }
    let bytes = tokio::fs::read(&args.input).await?;
    let content_type = ImageFormat::from_path(&args.input)
        .ok()
        .map(|f| f.to_mime_type().to_string());

    let request = EnhancementRequest::new(bytes, content_type, LOCAL_USER)
        .with_version(args.model.as_deref().unwrap_or(DEFAULT_VERSION))
        .with_upscale(args.upscale.unwrap_or(DEFAULT_UPSCALE))
        .with_background(args.bg_upsampler, args.bg_scale);
    let validated = request
        .validate_blocking(runtime.config().server.max_upload_bytes)
        .await?;
    info!("Enhancing {} with {}", args.input.display(), validated.key);

    let restored = runtime
        .enhancer()
        .engines()
        .acquire(validated.key)
        .await?
        .run(validated.image)
        .await?;
    let jpeg = encode_jpeg(&restored)?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&output, &jpeg).await?;

    info!(
        "Wrote {} ({}x{}) in {:.2}s",
        output.display(),
        restored.width(),
        restored.height(),
        start.elapsed().as_secs_f64()
    );
    Ok(output)
}
