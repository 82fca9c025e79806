//! Result sinks: hand encoded results to durable storage and get a locator
//! back.
//!
//! Every object is keyed as `<canonical id>/restored_<random hex>.jpg`. The
//! owner prefix keeps users apart; the random suffix keeps uploads from the
//! same user from overwriting each other.

mod local;
mod supabase;

pub use local::LocalDirSink;
pub use supabase::SupabaseSink;

use crate::constants::{OUTPUT_EXTENSION, OUTPUT_PREFIX};
use crate::error::Result;
use crate::identity::CanonicalId;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Where a stored result can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    /// Random object id, also the key suffix.
    pub id: Uuid,
    /// Storage key relative to the sink root.
    pub key: String,
    /// Caller-resolvable URL.
    pub url: String,
}

/// Storage key for a new object owned by `owner`.
pub fn object_key(owner: &CanonicalId, id: Uuid) -> String {
    format!("{owner}/{OUTPUT_PREFIX}{}.{OUTPUT_EXTENSION}", id.simple())
}

/// Durable storage collaborator.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Persist `bytes` under a fresh key scoped by `owner`.
    ///
    /// Either the object is fully stored and a locator is returned, or an
    /// error is; no partial locator is ever produced.
    async fn store(&self, bytes: Vec<u8>, owner: &CanonicalId) -> Result<Locator>;
}
