// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for logvault

use anyhow::{anyhow, Context};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-backend settings. The database backend is always available; the
/// object store and queue are only wired when their section is present.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub file: FileStoreConfig,

    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,

    #[serde(default)]
    pub queue: Option<QueueConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Bound on each repository call
    #[serde(default = "default_db_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_db_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileStoreConfig {
    /// Root directory on Windows hosts; blank falls back to the default root
    #[serde(default)]
    pub windows_path: String,

    /// Root directory on Linux hosts; blank falls back to the default root
    #[serde(default)]
    pub linux_path: String,

    #[serde(default = "default_file_name")]
    pub file_name: String,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            windows_path: String::new(),
            linux_path: String::new(),
            file_name: default_file_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket_name: String,
    pub access_key: String,
    pub secret_key: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// Upper bound on concurrent per-object GETs during retrieval
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket_name: "logs".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            timeout_seconds: default_http_timeout(),
            max_retries: default_retries(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl ObjectStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_host")]
    pub host: String,

    #[serde(default = "default_queue_port")]
    pub port: u16,

    #[serde(default = "default_queue_user")]
    pub username: String,

    #[serde(default = "default_queue_user")]
    pub password: String,

    #[serde(default = "default_vhost")]
    pub vhost: String,

    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Maximum entries held by the consumer buffer before the oldest is evicted
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_prefetch")]
    pub prefetch_count: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: default_queue_host(),
            port: default_queue_port(),
            username: default_queue_user(),
            password: default_queue_user(),
            vhost: default_vhost(),
            queue_name: default_queue_name(),
            buffer_capacity: default_buffer_capacity(),
            prefetch_count: default_prefetch(),
            connect_timeout_seconds: default_connect_timeout(),
            publish_timeout_seconds: default_publish_timeout(),
        }
    }
}

impl QueueConfig {
    /// AMQP URI with percent-encoded credentials and vhost
    pub fn amqp_uri(&self) -> anyhow::Result<String> {
        let mut uri = Url::parse(&format!("amqp://{}:{}", self.host, self.port))
            .with_context(|| format!("Invalid RabbitMQ host '{}'", self.host))?;
        uri.set_username(&self.username)
            .map_err(|_| anyhow!("Cannot set RabbitMQ username"))?;
        uri.set_password(Some(&self.password))
            .map_err(|_| anyhow!("Cannot set RabbitMQ password"))?;

        if self.vhost == "/" {
            uri.set_path("/%2f");
        } else {
            uri.path_segments_mut()
                .map_err(|_| anyhow!("RabbitMQ URI cannot carry a vhost"))?
                .clear()
                .push(self.vhost.trim_start_matches('/'));
        }
        Ok(uri.to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,  // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String,  // "text", "compact"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_db_timeout() -> u64 { 30 }
fn default_file_name() -> String { "logs.json".to_string() }
fn default_http_timeout() -> u64 { 30 }
fn default_retries() -> u32 { 3 }
fn default_fetch_concurrency() -> usize { 8 }
fn default_queue_host() -> String { "localhost".to_string() }
fn default_queue_port() -> u16 { 5672 }
fn default_queue_user() -> String { "guest".to_string() }
fn default_vhost() -> String { "/".to_string() }
fn default_queue_name() -> String { "LogQueue".to_string() }
fn default_buffer_capacity() -> usize { 10_000 }
fn default_prefetch() -> u16 { 100 }
fn default_connect_timeout() -> u64 { 10 }
fn default_publish_timeout() -> u64 { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
