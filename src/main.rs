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

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use logvault::config::{apply_env_overrides, load_config_with_env, AppConfig, LoggingConfig};
use logvault::{
    BackendFactory, LogEntry, LogFilter, LogLevel, NewLogEntry, Page, PageRequest, StorageError,
    StorageResponse, StorageRouter, StorageType,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// logvault - store and query logs across pluggable backends
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store one log entry
    Store {
        /// Backend selector (database, file, objectstore, queue); defaults to database
        #[arg(short, long)]
        backend: Option<String>,

        #[arg(long)]
        service: String,

        #[arg(long, default_value = "info")]
        level: LogLevel,

        #[arg(long)]
        message: String,

        /// Event time (RFC 3339); defaults to now
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },

    /// Retrieve a filtered page of log entries (not available for the queue backend)
    Retrieve {
        #[arg(short, long)]
        backend: Option<String>,

        /// Case-insensitive service substring
        #[arg(long)]
        service: Option<String>,

        #[arg(long)]
        level: Option<LogLevel>,

        #[arg(long)]
        start: Option<DateTime<Utc>>,

        #[arg(long)]
        end: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 10)]
        page_size: usize,
    },

    /// Fetch one log entry by id
    Get {
        #[arg(short, long)]
        backend: Option<String>,

        id: u64,
    },

    /// Run the queue consumer until Ctrl+C
    Consume,
}

fn load(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        return load_config_with_env(path);
    }
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let log_level = match logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the JSON envelope
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    if logging.format == "compact" {
        tracing::subscriber::set_global_default(builder.compact().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize response")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    let config = load(&args.config)?;
    init_tracing(&config.logging)?;

    info!("Starting logvault");
    info!("Loaded configuration from: {:?}", args.config);

    let router = BackendFactory::build_router(&config.storage)?;

    match args.command {
        Command::Store {
            backend,
            service,
            level,
            message,
            timestamp,
        } => {
            let entry = NewLogEntry::new(service, level, message, timestamp.unwrap_or_else(Utc::now));
            let response = router.store_log(backend.as_deref(), entry).await;
            print_json(&response)?;
        }

        Command::Retrieve {
            backend,
            service,
            level,
            start,
            end,
            page,
            page_size,
        } => {
            // The queue buffer only fills while `consume` runs
            if let Ok(StorageType::Queue) = StorageRouter::parse_selector(backend.as_deref()) {
                let err = StorageError::NotSupported {
                    backend: "queue",
                    operation: "retrieve outside `logvault consume`",
                };
                print_json(&StorageResponse::<Page<LogEntry>>::failure(&err))?;
                router.shutdown().await?;
                return Ok(());
            }

            let filter = LogFilter {
                service,
                level,
                start_time: start,
                end_time: end,
            };
            let response = router
                .retrieve_logs(backend.as_deref(), filter, PageRequest::new(page, page_size))
                .await;
            print_json(&response)?;
        }

        Command::Get { backend, id } => {
            let response = router.get_log_by_id(backend.as_deref(), id).await;
            print_json(&response)?;
        }

        Command::Consume => {
            let queue = router
                .resolve(Some(StorageType::Queue.as_str()))
                .context("Queue backend is not configured")?;
            queue.initialize().await?;
            info!("Consuming; press Ctrl+C to stop");

            tokio::signal::ctrl_c().await?;
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Cleanup
    if let Err(e) = router.shutdown().await {
        warn!("Shutdown reported an error: {}", e);
    }
    info!("logvault shut down successfully");

    Ok(())
}
