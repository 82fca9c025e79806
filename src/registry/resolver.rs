//! Local-versus-remote weight resolution.

use super::types::WeightSource;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a network's weights come from for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightLocation {
    /// File already present in the local cache.
    Local(PathBuf),
    /// Must be fetched from this URL before loading.
    Remote(String),
}

impl WeightLocation {
    /// Whether the weights are already on disk.
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

/// Cache path a weight file lives at, whether or not it exists yet.
pub fn weight_path<S: WeightSource + ?Sized>(spec: &S, cache_root: &Path) -> PathBuf {
    cache_root
        .join(spec.family().dir_name())
        .join(spec.weight_file_name())
}

/// Decide between the cached file and the remote URL.
///
/// Checks for `cache_root/<family>/<weight file>` at call time. A missing
/// file is the normal remote branch, never an error; no network I/O happens
/// here.
pub fn resolve<S: WeightSource + ?Sized>(spec: &S, cache_root: &Path) -> WeightLocation {
    let path = weight_path(spec, cache_root);
    if path.is_file() {
        debug!("Using cached weights: {}", path.display());
        WeightLocation::Local(path)
    } else {
        debug!(
            "Weights not cached at {}, resolving to {}",
            path.display(),
            spec.remote_url()
        );
        WeightLocation::Remote(spec.remote_url().to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::{ModelFamily, ModelRegistry, ModelVersion, UpsampleScale};
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_resolves_remote() {
        let dir = tempdir().unwrap();
        let spec = ModelRegistry::default().spec(ModelVersion::V1_4);
        assert_eq!(
            resolve(&spec, dir.path()),
            WeightLocation::Remote(spec.remote_url.clone())
        );
    }

    #[test]
    fn test_flipping_presence_flips_result() {
        let dir = tempdir().unwrap();
        let spec = ModelRegistry::default().upsampler(UpsampleScale::X2);
        let path = weight_path(&spec, dir.path());

        assert!(!resolve(&spec, dir.path()).is_local());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"weights").unwrap();
        assert_eq!(resolve(&spec, dir.path()), WeightLocation::Local(path.clone()));

        std::fs::remove_file(&path).unwrap();
        assert!(!resolve(&spec, dir.path()).is_local());
    }

    #[test]
    fn test_directory_with_weight_name_is_not_local() {
        let dir = tempdir().unwrap();
        let spec = ModelRegistry::default().detector();
        std::fs::create_dir_all(weight_path(&spec, dir.path())).unwrap();
        assert!(!resolve(&spec, dir.path()).is_local());
    }

    #[test]
    fn test_weight_path_uses_family_directory() {
        let spec = ModelRegistry::default().spec(ModelVersion::V1_2);
        let path = weight_path(&spec, Path::new("/cache"));
        assert_eq!(
            path,
            Path::new("/cache")
                .join(ModelFamily::Gfpgan.dir_name())
                .join(spec.weight_file_name)
        );
    }
}
