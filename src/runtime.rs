//! Process-wide state.
//!
//! Device detection, directory setup and engine/storage wiring happen once in
//! [`Runtime::initialize`]. Requests are only served while the runtime is
//! [`RuntimeState::Ready`]; [`Runtime::shutdown`] releases cached engines.

use crate::config::{self, Config, StorageBackend};
use crate::error::{Error, Result};
use crate::inference::{
    EngineBuilder, ExecutionTarget, NetworkLoader, OnnxLoader, is_cuda_available,
};
use crate::pipeline::{EngineCache, Enhancer};
use crate::registry::{ModelRegistry, WeightFetcher};
use crate::storage::{LocalDirSink, ResultSink, SupabaseSink};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{info, warn};

/// Lifecycle of the process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    /// Initialization has not completed.
    Initializing,
    /// Serving requests.
    Ready,
    /// Shutdown in progress or done.
    Stopped,
}

impl RuntimeState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ready,
            2 => Self::Stopped,
            _ => Self::Initializing,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::Ready => 1,
            Self::Stopped => 2,
        }
    }
}

/// Readiness report for orchestration health checks.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy` when ready, otherwise the lifecycle state.
    pub status: &'static str,
    /// Lifecycle state.
    pub state: RuntimeState,
    /// Whether a CUDA runtime was found at startup.
    pub cuda_available: bool,
    /// Device and precision in use.
    pub device: String,
    /// Whether identity translation is available.
    pub identity_initialized: bool,
    /// Whether the weight cache directory accepts writes.
    pub weights_dir_writable: bool,
    /// Whether the local output directory exists.
    pub output_dir_exists: bool,
    /// Whether the local output directory accepts writes.
    pub output_dir_writable: bool,
    /// Active storage backend.
    pub storage_backend: &'static str,
    /// Engines currently cached.
    pub cached_engines: usize,
}

/// Initialized process state shared by every request.
pub struct Runtime {
    config: Config,
    target: ExecutionTarget,
    cuda_available: bool,
    weights_dir: PathBuf,
    output_dir: PathBuf,
    enhancer: Enhancer,
    state: AtomicU8,
}

impl Runtime {
    /// Initialize with the ONNX Runtime loader and hardware detection.
    pub fn initialize(config: Config) -> Result<Arc<Self>> {
        let cuda_available = is_cuda_available();
        Self::initialize_with(config, Arc::new(OnnxLoader::new()), cuda_available)
    }

    /// Initialize with an explicit network loader and hardware availability.
    pub fn initialize_with(
        config: Config,
        loader: Arc<dyn NetworkLoader>,
        cuda_available: bool,
    ) -> Result<Arc<Self>> {
        config::validate_config(&config)?;

        let weights_dir = config::weights_dir(&config)?;
        let output_dir = config::output_dir(&config)?;
        std::fs::create_dir_all(&weights_dir)?;
        if config.storage.backend == StorageBackend::Local {
            std::fs::create_dir_all(&output_dir)?;
        }
        info!("Weight cache: {}", weights_dir.display());

        let target = ExecutionTarget::select_with(config.inference.device, cuda_available);

        let registry = ModelRegistry::new(config.weights.mirror_url.clone());
        let fetcher = WeightFetcher::new(
            &weights_dir,
            config.weights.connect_timeout(),
            config.weights.download_timeout(),
        )?;
        let builder = EngineBuilder::new(registry, fetcher, loader, target);
        let capacity = NonZeroUsize::new(config.inference.engine_cache_capacity).ok_or_else(|| {
            Error::ConfigValidation {
                message: "inference.engine_cache_capacity must be at least 1".to_string(),
            }
        })?;
        let engines = Arc::new(EngineCache::new(
            builder,
            capacity,
            config.inference.max_concurrent_inference,
        ));

        let sink = build_sink(&config, &output_dir)?;
        info!("Storage backend: {}", sink.name());
        let enhancer = Enhancer::new(engines, sink, config.server.max_upload_bytes);

        let runtime = Self {
            config,
            target,
            cuda_available,
            weights_dir,
            output_dir,
            enhancer,
            state: AtomicU8::new(RuntimeState::Initializing.as_u8()),
        };
        runtime.set_state(RuntimeState::Ready);
        info!("Runtime ready on {}", target);
        Ok(Arc::new(runtime))
    }

    fn set_state(&self, state: RuntimeState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether requests may be served.
    pub fn is_ready(&self) -> bool {
        self.state() == RuntimeState::Ready
    }

    /// Effective configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Selected device and precision.
    pub const fn target(&self) -> ExecutionTarget {
        self.target
    }

    /// Weight cache root.
    pub fn weights_dir(&self) -> &Path {
        &self.weights_dir
    }

    /// Local output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Request processor.
    pub const fn enhancer(&self) -> &Enhancer {
        &self.enhancer
    }

    /// Stop serving and release cached engines.
    pub fn shutdown(&self) {
        if self.state() == RuntimeState::Stopped {
            return;
        }
        self.set_state(RuntimeState::Stopped);
        let cached = self.enhancer.engines().len();
        self.enhancer.engines().clear();
        info!("Runtime stopped, released {} cached engine(s)", cached);
    }

    /// Readiness report.
    pub fn health(&self) -> HealthReport {
        let state = self.state();
        HealthReport {
            status: match state {
                RuntimeState::Ready => "healthy",
                RuntimeState::Initializing => "initializing",
                RuntimeState::Stopped => "stopped",
            },
            state,
            cuda_available: self.cuda_available,
            device: self.target.to_string(),
            identity_initialized: state == RuntimeState::Ready,
            weights_dir_writable: is_writable(&self.weights_dir),
            output_dir_exists: self.output_dir.is_dir(),
            output_dir_writable: is_writable(&self.output_dir),
            storage_backend: self.enhancer.sink().name(),
            cached_engines: self.enhancer.engines().len(),
        }
    }
}

fn build_sink(config: &Config, output_dir: &Path) -> Result<Arc<dyn ResultSink>> {
    let storage = &config.storage;
    Ok(match storage.backend {
        StorageBackend::Local => {
            let base = Some(storage.public_base_url.clone()).filter(|u| !u.is_empty());
            if base.is_none() {
                warn!("storage.public_base_url is empty, results get file:// locators");
            }
            Arc::new(LocalDirSink::new(output_dir, base))
        }
        StorageBackend::Supabase => Arc::new(SupabaseSink::new(
            storage.supabase_url.clone(),
            storage.supabase_key.clone(),
            storage.bucket.clone(),
            config.weights.connect_timeout(),
            storage.request_timeout(),
        )?),
    })
}

/// Check a directory by creating and removing a file in it.
fn is_writable(dir: &Path) -> bool {
    let sentinel = dir.join(format!(".write-check-{}", uuid::Uuid::new_v4().simple()));
    match std::fs::write(&sentinel, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&sentinel);
            true
        }
        Err(_) => false,
    }
}
