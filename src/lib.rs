//! Reviver - face restoration and upscaling service.
//!
//! Uploaded photos go through GFPGAN/RestoreFormer face restoration and an
//! optional Real-ESRGAN background upsampler; results are stored per user
//! and returned as a URL.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod inference;
pub mod pipeline;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod storage;

use clap::Parser;
use cli::{Cli, Command, ConfigAction, GlobalArgs, ModelsAction, ServeArgs};
use config::{Config, InferenceDevice, config_file_path, load_config_file, save_config};
use registry::{ModelRegistry, WeightFetcher};
use runtime::Runtime;
use std::path::Path;
use tracing::info;

pub use error::{Error, Result};

/// Main entry point for reviver CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet);

    let config_path = match &cli.global.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };

    let Some(command) = cli.command else {
        cli::help::print_smart_help(config_path.exists());
        return Ok(());
    };

    let mut config = load_config_file(&config_path)?;
    apply_global_overrides(&mut config, &cli.global);

    match command {
        Command::Serve(args) => {
            apply_serve_overrides(&mut config, args);
            block_on(async move {
                let runtime = Runtime::initialize(config)?;
                server::serve(runtime).await
            })
        }
        Command::Enhance(args) => {
            if !args.input.is_file() {
                return Err(Error::InputNotFound { path: args.input });
            }
            block_on(async move {
                let runtime = Runtime::initialize(config)?;
                let output = cli::enhance::enhance_file(&runtime, &args).await;
                runtime.shutdown();
                println!("{}", output?.display());
                Ok(())
            })
        }
        Command::Models { action } => handle_models_command(action, &config, cli.global.quiet),
        Command::Config { action } => handle_config_command(action, &config_path),
        Command::Identity { token } => {
            handle_identity_command(&token);
            Ok(())
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    // ORT logging is suppressed by default because CUDA fallback is expected in auto mode.
    let filter_str = if quiet {
        "warn,ort=off".to_string()
    } else {
        match verbose {
            0 => "info,ort=off".to_string(),
            1 => "debug,ort=warn".to_string(),
            2 => "trace,ort=info".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // Logs go to stderr so command output on stdout stays scriptable.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal {
            message: format!("Failed to create async runtime: {e}"),
        })?;
    runtime.block_on(future)
}

fn apply_global_overrides(config: &mut Config, global: &GlobalArgs) {
    if let Some(dir) = &global.weights_dir {
        config.weights.dir = Some(dir.clone());
    }
    if global.gpu {
        config.inference.device = InferenceDevice::Gpu;
    } else if global.cpu {
        config.inference.device = InferenceDevice::Cpu;
    }
}

fn apply_serve_overrides(config: &mut Config, args: ServeArgs) {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(backend) = args.storage {
        config.storage.backend = backend;
    }
    if let Some(dir) = args.output_dir {
        config.storage.output_dir = Some(dir);
    }
    if let Some(url) = args.public_base_url {
        config.storage.public_base_url = url;
    }
    if let Some(url) = args.supabase_url {
        config.storage.supabase_url = url;
    }
    if let Some(key) = args.supabase_key {
        config.storage.supabase_key = key;
    }
}

fn handle_models_command(action: ModelsAction, config: &Config, quiet: bool) -> Result<()> {
    let registry = ModelRegistry::new(config.weights.mirror_url.clone());
    let weights_dir = config::weights_dir(config)?;

    match action {
        ModelsAction::List => {
            cli::models::print_models(&registry, &weights_dir);
            Ok(())
        }
        ModelsAction::Fetch { target } => {
            let fetcher = WeightFetcher::new(
                &weights_dir,
                config.weights.connect_timeout(),
                config.weights.download_timeout(),
            )?
            .with_progress(!quiet);
            block_on(async move {
                let fetched = cli::models::fetch_models(&registry, &fetcher, &target).await?;
                info!("Fetched {} weight file(s) into {}", fetched.len(), weights_dir.display());
                for path in fetched {
                    println!("{}", path.display());
                }
                Ok(())
            })
        }
    }
}

fn handle_config_command(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Init => {
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                save_config(&Config::default(), path)?;
                println!("Created configuration file: {}", path.display());
                println!("\nNext steps:");
                println!("  {} models fetch", constants::APP_NAME);
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config_file(path)?;
            let rendered =
                toml::to_string_pretty(&config).map_err(|e| Error::ConfigSerialize { source: e })?;
            print!("{rendered}");
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn handle_identity_command(token: &str) {
    let id = identity::translate(token);
    let origin = if identity::is_canonical(token) {
        "canonical"
    } else {
        "derived"
    };
    println!("{id} ({origin})");
}
