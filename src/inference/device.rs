//! Compute device detection and precision selection.
//!
//! Accelerated hardware is detected once at process start by looking for the
//! CUDA runtime library, the same library ONNX Runtime's CUDA provider loads.
//!
//! # Platform-Specific Search Paths
//!
//! - **Windows**: `PATH`
//! - **Linux**: `LD_LIBRARY_PATH` + `/usr/lib`, `/usr/local/lib`, `/usr/lib/x86_64-linux-gnu`, `/usr/lib64`
//! - **macOS**: `DYLD_LIBRARY_PATH` + `/usr/lib`, `/usr/local/lib`

use crate::config::InferenceDevice;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Device inference runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Host CPU.
    Cpu,
    /// NVIDIA GPU through CUDA/TensorRT.
    Cuda,
}

/// Numeric precision of network execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// 32-bit floats.
    Full,
    /// 16-bit floats; only used on accelerated hardware.
    Half,
}

/// Device and precision chosen at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTarget {
    /// Selected device.
    pub device: Device,
    /// Selected precision.
    pub precision: Precision,
}

impl ExecutionTarget {
    /// CPU with full precision.
    pub const CPU: Self = Self {
        device: Device::Cpu,
        precision: Precision::Full,
    };

    /// CUDA with half precision.
    pub const CUDA: Self = Self {
        device: Device::Cuda,
        precision: Precision::Half,
    };

    /// Pick the target given a known hardware availability.
    pub fn select_with(requested: InferenceDevice, cuda_available: bool) -> Self {
        let target = match requested {
            InferenceDevice::Cpu => Self::CPU,
            InferenceDevice::Auto if cuda_available => Self::CUDA,
            InferenceDevice::Auto => Self::CPU,
            InferenceDevice::Gpu if cuda_available => Self::CUDA,
            InferenceDevice::Gpu => {
                warn!("GPU requested but CUDA runtime not found, using CPU");
                Self::CPU
            }
        };
        info!("Inference target: {}", target);
        target
    }

    /// Whether half precision is in use.
    pub fn half_precision(self) -> bool {
        self.precision == Precision::Half
    }
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let device = match self.device {
            Device::Cpu => "CPU",
            Device::Cuda => "CUDA",
        };
        let precision = match self.precision {
            Precision::Full => "fp32",
            Precision::Half => "fp16",
        };
        write!(f, "{device} ({precision})")
    }
}

/// CUDA runtime library name patterns for the current platform.
pub fn cuda_library_patterns() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["cudart64_*.dll"]
    }
    #[cfg(target_os = "linux")]
    {
        &["libcudart.so.*"]
    }
    #[cfg(target_os = "macos")]
    {
        &["libcudart.*.dylib"]
    }
}

/// Whether a CUDA runtime library is present on this machine.
pub fn is_cuda_available() -> bool {
    let patterns = cuda_library_patterns();
    let search_paths = library_search_paths();

    debug!(
        "Checking for CUDA runtime libraries matching {:?} in {} paths",
        patterns,
        search_paths.len()
    );

    let found = search_paths
        .iter()
        .any(|dir| dir_contains_match(dir, patterns));
    debug!("CUDA runtime libraries {}", if found { "found" } else { "not found" });
    found
}

fn env_paths(var: &str, separator: char) -> Vec<PathBuf> {
    match std::env::var(var) {
        Ok(value) => value
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(std::env::VarError::NotUnicode(_)) => {
            debug!("{var} contains invalid Unicode, ignoring");
            Vec::new()
        }
        Err(std::env::VarError::NotPresent) => Vec::new(),
    }
}

/// Directories searched for shared libraries.
pub fn library_search_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        env_paths("PATH", ';')
    }

    #[cfg(target_os = "linux")]
    {
        let mut paths = env_paths("LD_LIBRARY_PATH", ':');
        paths.extend(
            ["/usr/lib", "/usr/local/lib", "/usr/lib/x86_64-linux-gnu", "/usr/lib64"]
                .into_iter()
                .map(PathBuf::from),
        );
        paths
    }

    #[cfg(target_os = "macos")]
    {
        let mut paths = env_paths("DYLD_LIBRARY_PATH", ':');
        paths.extend(["/usr/lib", "/usr/local/lib"].into_iter().map(PathBuf::from));
        paths
    }
}

fn dir_contains_match(dir: &std::path::Path, patterns: &[&str]) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };

    entries.flatten().any(|entry| {
        let path = entry.path();
        path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| patterns.iter().any(|p| matches_pattern(name, p)))
    })
}

/// Match a file name against a pattern with `*` (any run) and `?` (one char).
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut n, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            n += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((sp, sn)) = star {
            p = sp + 1;
            n = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
