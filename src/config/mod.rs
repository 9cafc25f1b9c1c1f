// Configuration module for logvault
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config);
    ConfigLoader::validate(&config)?;
    Ok(config)
}

/// Allow environment variables to override config values
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(root) = std::env::var("LOGVAULT_FILE_ROOT") {
        config.storage.file.linux_path = root.clone();
        config.storage.file.windows_path = root;
    }

    if let Some(object_store) = config.storage.object_store.as_mut() {
        if let Ok(endpoint) = std::env::var("S3_ENDPOINT") {
            object_store.endpoint = endpoint;
        }
        if let Ok(access_key) = std::env::var("S3_ACCESS_KEY") {
            object_store.access_key = access_key;
        }
        if let Ok(secret_key) = std::env::var("S3_SECRET_KEY") {
            object_store.secret_key = secret_key;
        }
    }

    if let Some(queue) = config.storage.queue.as_mut() {
        if let Ok(host) = std::env::var("RABBITMQ_HOST") {
            queue.host = host;
        }
        if let Ok(username) = std::env::var("RABBITMQ_USERNAME") {
            queue.username = username;
        }
        if let Ok(password) = std::env::var("RABBITMQ_PASSWORD") {
            queue.password = password;
        }
    }
}
