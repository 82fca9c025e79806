//! Local directory sink.

use super::{Locator, ResultSink, object_key};
use crate::error::{Error, Result};
use crate::identity::CanonicalId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Writes results under a directory.
///
/// Locators are `public_base_url/<key>` when a base URL is configured (the
/// server serves the directory statically), otherwise `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalDirSink {
    /// Create a sink rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        let public_base_url = public_base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    /// Directory results are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn url_for(&self, key: &str, path: &Path) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("file://{}", path.display()),
        }
    }
}

#[async_trait]
impl ResultSink for LocalDirSink {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn store(&self, bytes: Vec<u8>, owner: &CanonicalId) -> Result<Locator> {
        let id = Uuid::new_v4();
        let key = object_key(owner, id);
        let path = self.root.join(&key);

        let storage_err = |e: std::io::Error| Error::Storage {
            reason: format!("failed to write '{}': {e}", path.display()),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }
        tokio::fs::write(&path, &bytes).await.map_err(storage_err)?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());

        Ok(Locator {
            id,
            url: self.url_for(&key, &path),
            key,
        })
    }
}
