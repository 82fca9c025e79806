//! Weight cache listing and prefetching.

#![allow(clippy::print_stdout)]

use crate::error::Result;
use crate::registry::{
    ModelRegistry, ModelVersion, UpsampleScale, WeightFetcher, WeightSource, resolve, weight_path,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// One weight file known to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRow {
    /// What the weights are used for.
    pub role: String,
    /// Weight file name.
    pub file: String,
    /// Cache path.
    pub path: PathBuf,
    /// Whether the file is already cached.
    pub cached: bool,
}

type Source = Box<dyn WeightSource + Send + Sync>;

fn all_sources(registry: &ModelRegistry) -> Vec<(String, Source)> {
    let mut sources: Vec<(String, Source)> = registry
        .restoration_specs()
        .into_iter()
        .map(|spec| {
            let role = format!("restorer {} ({})", spec.version, spec.architecture);
            (role, Box::new(spec) as Source)
        })
        .collect();
    for scale in [UpsampleScale::X2, UpsampleScale::X4] {
        sources.push((
            format!("background realesrgan {scale}"),
            Box::new(registry.upsampler(scale)) as Source,
        ));
    }
    sources.push(("face detector".to_string(), Box::new(registry.detector()) as Source));
    sources
}

/// Every registry weight file and its cache status.
pub fn model_rows(registry: &ModelRegistry, cache_root: &Path) -> Vec<ModelRow> {
    all_sources(registry)
        .into_iter()
        .map(|(role, source)| ModelRow {
            role,
            file: source.weight_file_name().to_string(),
            path: weight_path(source.as_ref(), cache_root),
            cached: resolve(source.as_ref(), cache_root).is_local(),
        })
        .collect()
}

/// Print the registry with cache status.
pub fn print_models(registry: &ModelRegistry, cache_root: &Path) {
    println!("Weight cache: {}", cache_root.display());
    println!();
    for row in model_rows(registry, cache_root) {
        let marker = if row.cached { "cached" } else { "remote" };
        println!("  {:<32} {:<28} [{marker}]", row.role, row.file);
    }
    println!();
    println!("Default version: {}", ModelVersion::default());
}

/// Weights needed for `target`: a version tag or `all`.
fn sources_for(registry: &ModelRegistry, target: &str) -> Result<Vec<(String, Source)>> {
    if target.trim().eq_ignore_ascii_case("all") {
        return Ok(all_sources(registry));
    }
    let spec = registry.lookup(target)?;
    Ok(vec![
        (format!("restorer {}", spec.version), Box::new(spec) as Source),
        ("face detector".to_string(), Box::new(registry.detector()) as Source),
    ])
}

/// Download every missing weight file for `target`.
///
/// Returns the paths that were downloaded; already cached files are skipped.
pub async fn fetch_models(
    registry: &ModelRegistry,
    fetcher: &WeightFetcher,
    target: &str,
) -> Result<Vec<PathBuf>> {
    let mut fetched = Vec::new();
    for (role, source) in sources_for(registry, target)? {
        let location = resolve(source.as_ref(), fetcher.cache_root());
        if location.is_local() {
            info!("{} already cached", role);
            continue;
        }
        fetched.push(fetcher.materialize(source.as_ref(), &location).await?);
    }
    Ok(fetched)
}
