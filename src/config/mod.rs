//! Configuration loading and management.

mod file;
mod paths;
mod types;
mod validate;

pub use file::{load_config_file, save_config};
pub use paths::{config_dir, config_file_path, data_dir, output_dir, weights_dir};
pub use types::{
    Config, InferenceConfig, InferenceDevice, ServerConfig, StorageBackend, StorageConfig,
    WeightsConfig,
};
pub use validate::validate_config;
