//! Supabase Storage sink.

use super::{Locator, ResultSink, object_key};
use crate::constants::storage::CACHE_CONTROL_SECS;
use crate::error::{Error, Result};
use crate::identity::CanonicalId;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Uploads results to a Supabase Storage bucket over its REST API.
#[derive(Debug, Clone)]
pub struct SupabaseSink {
    client: Client,
    base_url: String,
    key: String,
    bucket: String,
}

impl SupabaseSink {
    /// Create a sink for `bucket` on the project at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        key: impl Into<String>,
        bucket: impl Into<String>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            bucket: bucket.into(),
        })
    }

    fn upload_url(&self, object: &str) -> String {
        format!("{}/storage/v1/object/{}/{object}", self.base_url, self.bucket)
    }

    /// Public URL of an object in the bucket.
    pub fn public_url(&self, object: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{object}",
            self.base_url, self.bucket
        )
    }
}

#[async_trait]
impl ResultSink for SupabaseSink {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn store(&self, bytes: Vec<u8>, owner: &CanonicalId) -> Result<Locator> {
        let id = Uuid::new_v4();
        let key = object_key(owner, id);
        let url = self.upload_url(&key);
        let size = bytes.len();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .header("content-type", "image/jpeg")
            .header("cache-control", format!("max-age={CACHE_CONTROL_SECS}"))
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::StorageRequest {
                url: url.clone(),
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Storage {
                reason: format!("upload of '{key}' rejected with HTTP {status}: {body}"),
            });
        }

        debug!("Uploaded {} bytes to {}", size, url);
        info!("Stored result in bucket '{}' as {}", self.bucket, key);
        Ok(Locator {
            id,
            url: self.public_url(&key),
            key,
        })
    }
}
