//! Configuration validation.

use crate::config::{Config, StorageBackend};
use crate::error::{Error, Result};

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(config)?;
    validate_weights(config)?;
    validate_inference(config)?;
    validate_storage(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        return Err(invalid("server.port must not be 0"));
    }
    if config.server.max_upload_bytes == 0 {
        return Err(invalid("server.max_upload_bytes must be at least 1"));
    }
    Ok(())
}

fn validate_weights(config: &Config) -> Result<()> {
    let weights = &config.weights;
    if !(weights.mirror_url.starts_with("http://") || weights.mirror_url.starts_with("https://")) {
        return Err(invalid(format!(
            "weights.mirror_url must be an http(s) URL, got '{}'",
            weights.mirror_url
        )));
    }
    if weights.connect_timeout_secs == 0 || weights.download_timeout_secs == 0 {
        return Err(invalid("weights timeouts must be at least 1 second"));
    }
    Ok(())
}

fn validate_inference(config: &Config) -> Result<()> {
    if config.inference.engine_cache_capacity == 0 {
        return Err(invalid("inference.engine_cache_capacity must be at least 1"));
    }
    if config.inference.max_concurrent_inference == 0 {
        return Err(invalid("inference.max_concurrent_inference must be at least 1"));
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<()> {
    let storage = &config.storage;
    if storage.request_timeout_secs == 0 {
        return Err(invalid("storage.request_timeout_secs must be at least 1"));
    }
    if storage.backend == StorageBackend::Supabase {
        if storage.supabase_url.is_empty() || storage.supabase_key.is_empty() {
            return Err(invalid(
                "storage.backend = \"supabase\" requires supabase_url and supabase_key",
            ));
        }
        if storage.bucket.is_empty() {
            return Err(invalid("storage.bucket must not be empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_cache_capacity() {
        let mut config = Config::default();
        config.inference.engine_cache_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.inference.max_concurrent_inference = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_mirror() {
        let mut config = Config::default();
        config.weights.mirror_url = "ftp://mirror".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(Error::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_validate_supabase_requires_credentials() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Supabase;
        assert!(validate_config(&config).is_err());

        config.storage.supabase_url = "https://project.supabase.co".to_string();
        config.storage.supabase_key = "key".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
