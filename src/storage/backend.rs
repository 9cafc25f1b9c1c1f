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

// Log storage contract implemented by every backend

use crate::error::StorageError;
use crate::protocol::{LogEntry, LogFilter, NewLogEntry, Page, PageRequest, Receipt, StorageType};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

pub type StorageResult<T> = Result<T, StorageError>;

/// Uniform log storage contract
///
/// Every backend must give identical filter/pagination results for the same
/// data set. Medium-specific faults are converted to `StorageError` here and
/// never escape as panics.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Prepare the medium (create directories, start consumers)
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Persist one entry; backend assigns `id` and `created_date`
    async fn store(&self, entry: NewLogEntry) -> StorageResult<Receipt>;

    /// Filter then paginate
    ///
    /// # Arguments
    /// * `filter` - Predicates; absent fields are skipped
    /// * `page` - Already validated 1-based page coordinates
    async fn retrieve(&self, filter: &LogFilter, page: PageRequest) -> StorageResult<Page<LogEntry>>;

    async fn get_by_id(&self, id: u64) -> StorageResult<LogEntry>;

    /// Health check
    async fn health_check(&self) -> bool;

    /// Release long-lived resources (connections, background tasks)
    async fn shutdown(&self) -> StorageResult<()> {
        Ok(())
    }

    fn storage_type(&self) -> StorageType;
}

/// Standard receipt message for a successful write
pub fn saved_message(service: &str, storage_type: StorageType) -> String {
    format!("Log [{}] saved to {} successfully", service, storage_type)
}

/// Run `op` until it succeeds or `max_retries` retries are exhausted
///
/// Backoff starts at 100ms, doubles per attempt and is capped at 30 seconds.
/// Only `BackendUnavailable` errors are retried.
pub async fn with_retry<T, F, Fut>(label: &str, max_retries: u32, mut op: F) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut attempt = 0;
    let mut delay = Duration::from_millis(100);

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!("'{}' succeeded after {} retries", label, attempt);
                }
                return Ok(value);
            }
            Err(e @ StorageError::BackendUnavailable(_)) if attempt < max_retries => {
                warn!(
                    "'{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                    label,
                    attempt + 1,
                    max_retries,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // Exponential backoff
                delay = delay.min(Duration::from_secs(30)); // Cap at 30 seconds
                attempt += 1;
            }
            Err(e) => {
                error!("'{}' failed after {} attempts: {}", label, attempt + 1, e);
                return Err(e);
            }
        }
    }
}
