//! Weight download into the local cache.

use super::resolver::{WeightLocation, weight_path};
use super::types::WeightSource;
use crate::error::{Error, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Download a file, writing to a temporary sibling and renaming on success.
///
/// A partially written file never appears under `dest`, so an interrupted
/// download cannot later be mistaken for cached weights.
pub async fn download_file(client: &Client, url: &str, dest: &Path, progress: bool) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::DownloadFailed {
            url: url.to_string(),
            source: Box::new(e),
        })?;

    if !response.status().is_success() {
        return Err(Error::DownloadFailed {
            url: url.to_string(),
            source: format!("HTTP {}", response.status()).into(),
        });
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = if progress {
        let pb = ProgressBar::new(total_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes})")
                .map_err(|e| Error::Internal {
                    message: format!("Failed to create progress bar: {e}"),
                })?
                .progress_chars("█▓▒░ "),
        );
        pb.set_message(format!(
            "Downloading {}...",
            dest.file_name().map_or_else(
                || std::borrow::Cow::Borrowed("weights"),
                |n| n.to_string_lossy()
            )
        ));
        pb
    } else {
        ProgressBar::hidden()
    };

    let part = part_path(dest);
    let written = stream_into(response, &part, dest, url, &pb).await;
    if written.is_err() {
        let _ = tokio::fs::remove_file(&part).await;
    }
    let downloaded = written?;

    pb.finish_with_message("Download complete");
    debug!("Downloaded {} bytes from {}", downloaded, url);
    Ok(())
}

/// Stream the body into `part`, then move it to `dest`.
///
/// The caller removes `part` when this fails.
async fn stream_into(
    response: reqwest::Response,
    part: &Path,
    dest: &Path,
    url: &str,
    pb: &ProgressBar,
) -> Result<u64> {
    let mut file = File::create(part).await.map_err(|e| cache_error(dest, &e))?;
    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::DownloadFailed {
            url: url.to_string(),
            source: Box::new(e),
        })?;
        file.write_all(&chunk).await.map_err(|e| cache_error(dest, &e))?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush().await.map_err(|e| cache_error(dest, &e))?;
    drop(file);
    tokio::fs::rename(part, dest)
        .await
        .map_err(|e| cache_error(dest, &e))?;
    Ok(downloaded)
}

/// Local cache failures while fetching weights are model setup failures.
fn cache_error(path: &Path, e: &std::io::Error) -> Error {
    Error::ModelInit {
        model: path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
        reason: format!("weight cache write failed at {}: {e}", path.display()),
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map_or_else(|| "weights".into(), |n| n.to_string_lossy());
    dest.with_file_name(format!(".{name}.{}.part", uuid::Uuid::new_v4().simple()))
}

/// Turns a [`WeightLocation`] into a loadable file path.
#[derive(Debug, Clone)]
pub struct WeightFetcher {
    client: Client,
    cache_root: PathBuf,
    progress: bool,
}

impl WeightFetcher {
    /// Create a fetcher with connect and overall download timeouts.
    pub fn new(cache_root: impl Into<PathBuf>, connect_timeout: Duration, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            cache_root: cache_root.into(),
            progress: false,
        })
    }

    /// Show a progress bar while downloading.
    #[must_use]
    pub const fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Root of the weight cache.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Return a local path for the weights, downloading them if needed.
    ///
    /// Remote weights land in the cache, so the next resolution of the same
    /// spec takes the local branch.
    pub async fn materialize<S: WeightSource + ?Sized>(
        &self,
        spec: &S,
        location: &WeightLocation,
    ) -> Result<PathBuf> {
        match location {
            WeightLocation::Local(path) => Ok(path.clone()),
            WeightLocation::Remote(url) => {
                let dest = weight_path(spec, &self.cache_root);
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| cache_error(&dest, &e))?;
                }
                info!("Fetching {} from {}", spec.weight_file_name(), url);
                download_file(&self.client, url, &dest, self.progress).await?;
                Ok(dest)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::{ModelRegistry, ModelVersion, resolve};
    use tempfile::tempdir;
    use warp::Filter;

    fn fetcher(root: &Path) -> WeightFetcher {
        WeightFetcher::new(root, Duration::from_secs(5), Duration::from_secs(10)).unwrap()
    }

    #[tokio::test]
    async fn test_local_location_is_returned_as_is() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w.onnx");
        let spec = ModelRegistry::default().spec(ModelVersion::V1_4);
        let got = fetcher(dir.path())
            .materialize(&spec, &WeightLocation::Local(path.clone()))
            .await
            .unwrap();
        assert_eq!(got, path);
    }

    #[tokio::test]
    async fn test_remote_location_is_downloaded_into_cache() {
        let route = warp::path!("mirror" / String).map(|_name: String| "onnx-bytes");
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let dir = tempdir().unwrap();
        let registry = ModelRegistry::new(format!("http://{addr}/mirror"));
        let spec = registry.spec(ModelVersion::V1_3);

        let location = resolve(&spec, dir.path());
        assert!(!location.is_local());

        let path = fetcher(dir.path()).materialize(&spec, &location).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"onnx-bytes");
        assert!(resolve(&spec, dir.path()).is_local());
    }

    #[tokio::test]
    async fn test_http_error_is_download_failure() {
        let route = warp::any().map(|| warp::http::StatusCode::NOT_FOUND);
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let dir = tempdir().unwrap();
        let registry = ModelRegistry::new(format!("http://{addr}"));
        let spec = registry.detector();
        let location = resolve(&spec, dir.path());

        let err = fetcher(dir.path())
            .materialize(&spec, &location)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed { .. }));
        assert!(!resolve(&spec, dir.path()).is_local());
    }

    fn leftover_parts(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().path())
                    .filter(|p| p.extension().is_some_and(|ext| ext == "part"))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_unwritable_cache_root_is_model_init_failure() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, b"file").unwrap();

        let registry = ModelRegistry::new("http://127.0.0.1:9");
        let spec = registry.spec(ModelVersion::V1_4);
        let location = resolve(&spec, &root);

        let err = fetcher(&root).materialize(&spec, &location).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelInit);
    }

    #[tokio::test]
    async fn test_failed_rename_removes_partial_file() {
        let route = warp::path!("mirror" / String).map(|_name: String| "onnx-bytes");
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let dir = tempdir().unwrap();
        let registry = ModelRegistry::new(format!("http://{addr}/mirror"));
        let spec = registry.spec(ModelVersion::V1_3);
        // A directory squatting on the destination makes the final rename fail.
        let dest = weight_path(&spec, dir.path());
        std::fs::create_dir_all(dest.join("occupied")).unwrap();

        let location = resolve(&spec, dir.path());
        let err = fetcher(dir.path()).materialize(&spec, &location).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelInit);
        assert!(leftover_parts(dest.parent().unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_stalled_mirror_times_out_without_caching() {
        let route = warp::any().and_then(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, std::convert::Infallible>("too late")
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let dir = tempdir().unwrap();
        let registry = ModelRegistry::new(format!("http://{addr}"));
        let spec = registry.detector();
        let location = resolve(&spec, dir.path());

        let slow = WeightFetcher::new(dir.path(), Duration::from_secs(1), Duration::from_millis(300)).unwrap();
        let err = slow.materialize(&spec, &location).await.unwrap_err();
        assert!(matches!(err, Error::DownloadFailed { .. }));
        assert_eq!(err.kind(), ErrorKind::ModelInit);

        let dest = weight_path(&spec, dir.path());
        assert!(!dest.exists());
        assert!(!resolve(&spec, dir.path()).is_local());
        assert!(leftover_parts(dest.parent().unwrap()).is_empty());
    }
}
