//! Engine cache.
//!
//! Engines are expensive to build, so they are kept in a bounded LRU keyed by
//! the full configuration tuple. Each entry has its own async mutex:
//! requests with the same key share one engine and queue on it, requests with
//! different keys build and run independently. A device semaphore then
//! serializes access to the shared compute device across all engines.

use crate::error::{Error, Result};
use crate::inference::{EngineBuilder, EngineKey, RestorationEngine, execute};
use image::RgbImage;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, Semaphore};
use tracing::{debug, info};

type Slot = Arc<AsyncMutex<Option<RestorationEngine>>>;

/// Built engines in LRU order, plus slots whose first build is in flight.
///
/// Only built engines take an LRU position, so a key that cannot be built
/// never evicts one that can.
struct Index {
    ready: LruCache<EngineKey, Slot>,
    pending: HashMap<EngineKey, Slot>,
}

/// Bounded, per-key locked cache of restoration engines.
pub struct EngineCache {
    builder: EngineBuilder,
    index: Mutex<Index>,
    device: Arc<Semaphore>,
    builds: AtomicUsize,
}

impl EngineCache {
    /// Create a cache holding up to `capacity` engines, with
    /// `device_permits` concurrent inference calls.
    pub fn new(builder: EngineBuilder, capacity: NonZeroUsize, device_permits: usize) -> Self {
        Self {
            builder,
            index: Mutex::new(Index {
                ready: LruCache::new(capacity),
                pending: HashMap::new(),
            }),
            device: Arc::new(Semaphore::new(device_permits.max(1))),
            builds: AtomicUsize::new(0),
        }
    }

    /// Builder used for cache misses.
    pub const fn builder(&self) -> &EngineBuilder {
        &self.builder
    }

    /// Number of engines built since creation.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of engines currently cached.
    pub fn len(&self) -> usize {
        self.index.lock().map_or(0, |index| index.ready.len())
    }

    /// Whether no engine is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_index(&self) -> Result<MutexGuard<'_, Index>> {
        self.index.lock().map_err(|_| Error::Internal {
            message: "engine cache index lock poisoned".to_string(),
        })
    }

    fn slot(&self, key: &EngineKey) -> Result<Slot> {
        let mut index = self.lock_index()?;
        if let Some(slot) = index.ready.get(key) {
            return Ok(Arc::clone(slot));
        }
        Ok(Arc::clone(
            index
                .pending
                .entry(*key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(None))),
        ))
    }

    /// Take exclusive use of the engine for `key`, building it on a miss.
    ///
    /// Requests for a key whose build is in flight queue on the same slot.
    /// A failed build is never cached; the next request retries.
    pub async fn acquire(&self, key: EngineKey) -> Result<EngineLease> {
        let slot = self.slot(&key)?;
        let mut guard = Arc::clone(&slot).lock_owned().await;

        if guard.is_none() {
            info!("Building engine for {}", key);
            let built = self.builder.build_for(&key).await;
            let mut index = self.lock_index()?;
            if index
                .pending
                .get(&key)
                .is_some_and(|pending| Arc::ptr_eq(pending, &slot))
            {
                index.pending.remove(&key);
            }
            match built {
                Ok(engine) => {
                    *guard = Some(engine);
                    self.builds.fetch_add(1, Ordering::Relaxed);
                    if let Some((evicted, _)) = index.ready.push(key, slot)
                        && evicted != key
                    {
                        debug!("Evicted engine for {}", evicted);
                    }
                }
                Err(e) => {
                    debug!("Engine build for {} failed, not caching", key);
                    return Err(e);
                }
            }
        } else {
            debug!("Reusing cached engine for {}", key);
        }

        Ok(EngineLease {
            key,
            guard,
            device: Arc::clone(&self.device),
        })
    }

    /// Drop every cached engine.
    pub fn clear(&self) {
        if let Ok(mut index) = self.index.lock() {
            index.ready.clear();
        }
    }
}

/// Exclusive use of one cached engine.
pub struct EngineLease {
    key: EngineKey,
    guard: OwnedMutexGuard<Option<RestorationEngine>>,
    device: Arc<Semaphore>,
}

impl EngineLease {
    /// Key of the leased engine.
    pub const fn key(&self) -> &EngineKey {
        &self.key
    }

    /// Run the engine on `image` once the compute device is free.
    pub async fn run(self, image: RgbImage) -> Result<RgbImage> {
        let permit = Arc::clone(&self.device)
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal {
                message: format!("device gate closed: {e}"),
            })?;

        let mut guard = self.guard;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let engine = guard.as_mut().ok_or_else(|| Error::Internal {
                message: "leased engine slot is empty".to_string(),
            })?;
            execute(engine, &image)
        })
        .await
        .map_err(|e| Error::inference(format!("inference task failed: {e}")))?
    }
}
