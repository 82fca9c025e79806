//! CLI argument definitions.

use crate::config::StorageBackend;
use crate::constants::MAX_UPSCALE;
use crate::inference::BackgroundChoice;
use crate::registry::UpsampleScale;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Face restoration and upscaling with GFPGAN and Real-ESRGAN.
#[derive(Debug, Parser)]
#[command(name = "reviver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file (default: platform config directory).
    #[arg(long, global = true, env = "REVIVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Weight cache directory (overrides config).
    #[arg(long, global = true, env = "REVIVER_WEIGHTS_DIR")]
    pub weights_dir: Option<PathBuf>,

    /// Suppress progress output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: trace+ORT debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable CUDA GPU acceleration.
    #[arg(long, global = true, conflicts_with = "cpu")]
    pub gpu: bool,

    /// Force CPU inference.
    #[arg(long, global = true, conflicts_with = "gpu")]
    pub cpu: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Enhance a single image file locally.
    Enhance(EnhanceArgs),
    /// Manage model weights.
    Models {
        /// Models action to perform.
        #[command(subcommand)]
        action: ModelsAction,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the storage identifier for an identity token.
    Identity {
        /// Token issued by the identity provider.
        token: String,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Models subcommand actions.
#[derive(Debug, Subcommand)]
pub enum ModelsAction {
    /// List registry entries and whether their weights are cached.
    List,
    /// Download weights into the cache.
    Fetch {
        /// Restoration version to fetch (with the face detector), or `all`.
        #[arg(default_value = "all")]
        target: String,
    },
}

/// Arguments for the serve command.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Bind address (overrides config).
    #[arg(long, env = "REVIVER_HOST")]
    pub host: Option<String>,

    /// Bind port (overrides config).
    #[arg(short, long, env = "REVIVER_PORT")]
    pub port: Option<u16>,

    /// Storage backend (overrides config).
    #[arg(long, value_enum, env = "REVIVER_STORAGE")]
    pub storage: Option<StorageBackend>,

    /// Local output directory (overrides config).
    #[arg(short, long, env = "REVIVER_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Base URL local results are served under (overrides config).
    #[arg(long, env = "REVIVER_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Supabase project URL (overrides config).
    #[arg(long, env = "REVIVER_SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase service key (overrides config).
    #[arg(long, env = "REVIVER_SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,
}

/// Arguments for the enhance command.
#[derive(Debug, Args)]
pub struct EnhanceArgs {
    /// Image to enhance.
    pub input: PathBuf,

    /// Output JPEG path (default: `<input stem>_restored.jpg` next to the input).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Restoration model version (1.2, 1.3, 1.4, RestoreFormer).
    #[arg(short, long, env = "REVIVER_MODEL")]
    pub model: Option<String>,

    /// Overall upscale factor.
    #[arg(short, long, value_parser = parse_upscale)]
    pub upscale: Option<u32>,

    /// Background upsampler (none, realesrgan).
    #[arg(short, long, value_parser = parse_background, default_value = "none")]
    pub bg_upsampler: BackgroundChoice,

    /// Background upsampler scale (x2, x4).
    #[arg(long, value_parser = parse_scale, default_value = "x4")]
    pub bg_scale: UpsampleScale,
}

/// Parse and validate an upscale factor.
fn parse_upscale(s: &str) -> Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid integer"))?;

    if !(1..=MAX_UPSCALE).contains(&value) {
        return Err(format!(
            "upscale must be between 1 and {MAX_UPSCALE}, got {value}"
        ));
    }

    Ok(value)
}

/// Parse a background upsampler choice.
fn parse_background(s: &str) -> Result<BackgroundChoice, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

/// Parse a background upsampler scale.
fn parse_scale(s: &str) -> Result<UpsampleScale, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}
