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

// Database backend over the generic repository port

use super::backend::{saved_message, LogStore, StorageResult};
use super::repository::{LogQuery, LogRepository};
use crate::config::DatabaseConfig;
use crate::error::StorageError;
use crate::protocol::{LogEntry, LogFilter, NewLogEntry, Page, PageRequest, Receipt, StorageType};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

pub struct DatabaseStore {
    repository: Arc<dyn LogRepository>,
    timeout: Duration,
    // add + commit form one unit of work
    write_lock: Mutex<()>,
}

impl DatabaseStore {
    pub fn new(repository: Arc<dyn LogRepository>, config: &DatabaseConfig) -> Self {
        Self {
            repository,
            timeout: config.timeout(),
            write_lock: Mutex::new(()),
        }
    }

    /// Bound a repository call; elapsed or failed calls become `BackendUnavailable`
    async fn bounded<T, Fut>(&self, what: &str, fut: Fut) -> StorageResult<T>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StorageError::BackendUnavailable(format!("{}: {:#}", what, e))),
            Err(_) => Err(StorageError::BackendUnavailable(format!(
                "{} timed out after {:?}",
                what, self.timeout
            ))),
        }
    }
}

#[async_trait]
impl LogStore for DatabaseStore {
    async fn store(&self, entry: NewLogEntry) -> StorageResult<Receipt> {
        entry.validate()?;
        let service = entry.service.clone();
        let row = entry.into_entry(0, StorageType::Database);

        let _guard = self.write_lock.lock().await;

        let id = self
            .bounded("add", self.repository.add(row))
            .await
            .map_err(|e| StorageError::PersistenceFailure(e.to_string()))?;

        let affected = self
            .bounded("commit", self.repository.commit())
            .await
            .map_err(|e| StorageError::PersistenceFailure(e.to_string()))?;

        if affected == 0 {
            error!("Commit for log [{}] reported zero affected rows", service);
            return Err(StorageError::PersistenceFailure(
                "commit reported zero affected rows".to_string(),
            ));
        }

        let message = saved_message(&service, StorageType::Database);
        info!("{} (id={})", message, id);

        Ok(Receipt {
            message,
            id: Some(id),
            object_key: None,
        })
    }

    async fn retrieve(&self, filter: &LogFilter, page: PageRequest) -> StorageResult<Page<LogEntry>> {
        page.validate()?;
        let query = LogQuery {
            filter: filter.clone(),
            offset: page.offset(),
            limit: page.size,
        };

        let result = self.bounded("query", self.repository.query(&query)).await?;

        info!(
            "Retrieved {} log entries on page {} of {} total logs",
            result.rows.len(),
            page.index,
            result.total
        );

        Ok(Page {
            items: result.rows,
            total_count: result.total,
            page_index: page.index,
            page_size: page.size,
        })
    }

    async fn get_by_id(&self, id: u64) -> StorageResult<LogEntry> {
        match self.bounded("get_by_id", self.repository.get_by_id(id)).await? {
            Some(entry) => Ok(entry),
            None => Err(StorageError::NotFound(format!(
                "Log entry with ID {} not found.",
                id
            ))),
        }
    }

    async fn health_check(&self) -> bool {
        let health_query = LogQuery {
            limit: 0,
            ..Default::default()
        };
        self.bounded("health", self.repository.query(&health_query)).await.is_ok()
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Database
    }
}
