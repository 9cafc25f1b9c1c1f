// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::parse(&content)
    }

    /// Parse YAML content after substituting environment variables
    pub fn parse(content: &str) -> Result<AppConfig> {
        let content = Self::substitute_env_vars(content);

        let config: AppConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${S3_BUCKET:-logs} -> logs (if S3_BUCKET not set)
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").unwrap();

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        }).to_string()
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        if config.storage.database.timeout_seconds == 0 {
            bail!("storage.database.timeout_seconds must be > 0");
        }

        if config.storage.file.file_name.trim().is_empty() {
            bail!("storage.file.file_name cannot be empty");
        }

        if let Some(object_store) = &config.storage.object_store {
            if object_store.endpoint.trim().is_empty() {
                bail!("storage.object_store.endpoint cannot be empty");
            }
            if object_store.bucket_name.trim().is_empty() {
                bail!("storage.object_store.bucket_name cannot be empty");
            }
            if object_store.access_key.is_empty() || object_store.secret_key.is_empty() {
                bail!("storage.object_store access_key and secret_key are required");
            }
            if object_store.timeout_seconds == 0 {
                bail!("storage.object_store.timeout_seconds must be > 0");
            }
            if object_store.fetch_concurrency == 0 {
                bail!("storage.object_store.fetch_concurrency must be > 0");
            }
        }

        if let Some(queue) = &config.storage.queue {
            if queue.queue_name.trim().is_empty() {
                bail!("storage.queue.queue_name cannot be empty");
            }
            if queue.buffer_capacity == 0 {
                bail!("storage.queue.buffer_capacity must be > 0");
            }
            if queue.connect_timeout_seconds == 0 || queue.publish_timeout_seconds == 0 {
                bail!("storage.queue timeouts must be > 0");
            }
        }

        match config.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => bail!("logging.level '{}' is not one of trace, debug, info, warn, error", other),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("LOGVAULT_TEST_VAR", "test_value");

        let input = "endpoint: ${LOGVAULT_TEST_VAR}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "endpoint: test_value");

        std::env::remove_var("LOGVAULT_TEST_VAR");
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::remove_var("LOGVAULT_TEST_VAR2");

        let input = "bucket_name: ${LOGVAULT_TEST_VAR2:-logs}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "bucket_name: logs");
    }

    #[test]
    fn test_missing_var_without_default_is_kept() {
        std::env::remove_var("LOGVAULT_TEST_VAR3");

        let output = ConfigLoader::substitute_env_vars("key: ${LOGVAULT_TEST_VAR3}");
        assert_eq!(output, "key: ${LOGVAULT_TEST_VAR3}");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigLoader::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_object_store_credentials() {
        let mut config = AppConfig::default();
        config.storage.object_store = Some(ObjectStoreConfig::default());

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("access_key"));
    }

    #[test]
    fn test_validation_queue_capacity() {
        let mut config = AppConfig::default();
        config.storage.queue = Some(QueueConfig {
            buffer_capacity: 0,
            ..Default::default()
        });

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("buffer_capacity"));
    }

    #[test]
    fn test_validation_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();

        assert!(ConfigLoader::validate(&config).is_err());
    }
}
