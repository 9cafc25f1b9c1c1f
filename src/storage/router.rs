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

// Storage router: selector -> store dispatch

use super::backend::{LogStore, StorageResult};
use crate::error::StorageError;
use crate::protocol::{
    LogEntry, LogFilter, NewLogEntry, Page, PageRequest, Receipt, StorageResponse, StorageType,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Single entry point for callers
///
/// The selector map is fixed at construction. Every outcome, including
/// selector and validation errors, comes back as a `StorageResponse`.
pub struct StorageRouter {
    stores: HashMap<StorageType, Arc<dyn LogStore>>,
}

#[derive(Default)]
pub struct StorageRouterBuilder {
    stores: HashMap<StorageType, Arc<dyn LogStore>>,
}

impl StorageRouterBuilder {
    pub fn with_store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.stores.insert(store.storage_type(), store);
        self
    }

    pub fn build(self) -> StorageRouter {
        StorageRouter {
            stores: self.stores,
        }
    }
}

impl StorageRouter {
    pub fn builder() -> StorageRouterBuilder {
        StorageRouterBuilder::default()
    }

    /// Parse a selector; `None` or blank means Database
    pub fn parse_selector(selector: Option<&str>) -> StorageResult<StorageType> {
        match selector.map(str::trim) {
            None | Some("") => Ok(StorageType::Database),
            Some(value) => value.parse(),
        }
    }

    pub fn resolve(&self, selector: Option<&str>) -> StorageResult<Arc<dyn LogStore>> {
        let storage_type = Self::parse_selector(selector)?;
        self.stores
            .get(&storage_type)
            .cloned()
            .ok_or_else(|| StorageError::UnknownBackend(format!("{} (not configured)", storage_type)))
    }

    /// Configured backends
    pub fn storage_types(&self) -> Vec<StorageType> {
        StorageType::ALL
            .into_iter()
            .filter(|t| self.stores.contains_key(t))
            .collect()
    }

    pub async fn store_log(
        &self,
        selector: Option<&str>,
        entry: NewLogEntry,
    ) -> StorageResponse<Receipt> {
        let result = async {
            let store = self.resolve(selector)?;
            store.store(entry).await
        }
        .await;

        match result {
            Ok(receipt) => StorageResponse::success(receipt.message.clone(), receipt),
            Err(e) => respond_failure("store", selector, e),
        }
    }

    pub async fn retrieve_logs(
        &self,
        selector: Option<&str>,
        filter: LogFilter,
        page: PageRequest,
    ) -> StorageResponse<Page<LogEntry>> {
        let result = async {
            page.validate()?;
            let store = self.resolve(selector)?;
            store.retrieve(&filter, page).await
        }
        .await;

        match result {
            Ok(page) => {
                let message = format!(
                    "Retrieved {} log entries on page {} of {} total logs",
                    page.items.len(),
                    page.page_index,
                    page.total_count
                );
                info!("{}", message);
                StorageResponse::success(message, page)
            }
            Err(e) => respond_failure("retrieve", selector, e),
        }
    }

    pub async fn get_log_by_id(&self, selector: Option<&str>, id: u64) -> StorageResponse<LogEntry> {
        let result = async {
            let store = self.resolve(selector)?;
            store.get_by_id(id).await
        }
        .await;

        match result {
            Ok(entry) => {
                StorageResponse::success(format!("Log entry with ID {} retrieved successfully.", id), entry)
            }
            Err(e) => respond_failure("get_by_id", selector, e),
        }
    }

    /// Initialize every configured store; stops at the first failure
    pub async fn initialize_all(&self) -> StorageResult<()> {
        for storage_type in self.storage_types() {
            if let Some(store) = self.stores.get(&storage_type) {
                store.initialize().await?;
                info!("{} store initialized", storage_type);
            }
        }
        Ok(())
    }

    pub async fn health(&self) -> Vec<(StorageType, bool)> {
        let mut report = Vec::with_capacity(self.stores.len());
        for storage_type in self.storage_types() {
            if let Some(store) = self.stores.get(&storage_type) {
                report.push((storage_type, store.health_check().await));
            }
        }
        report
    }

    /// Teardown hook; every store is shut down even if one fails
    pub async fn shutdown(&self) -> StorageResult<()> {
        let mut first_error = None;
        for storage_type in self.storage_types() {
            if let Some(store) = self.stores.get(&storage_type) {
                if let Err(e) = store.shutdown().await {
                    error!("Failed to shut down {} store: {}", storage_type, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn respond_failure<T>(operation: &str, selector: Option<&str>, err: StorageError) -> StorageResponse<T> {
    let backend = selector.unwrap_or("database");
    match &err {
        StorageError::Validation(_) | StorageError::NotFound(_) | StorageError::NotSupported { .. } => {
            warn!("{} on '{}' rejected: {}", operation, backend, err)
        }
        _ => error!("{} on '{}' failed: {}", operation, backend, err),
    }
    StorageResponse::failure(&err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::error::ErrorKind;
    use crate::protocol::LogLevel;
    use crate::storage::database::DatabaseStore;
    use crate::storage::repository::InMemoryLogRepository;
    use chrono::Utc;

    fn create_test_router() -> StorageRouter {
        let database = DatabaseStore::new(Arc::new(InMemoryLogRepository::new()), &DatabaseConfig::default());
        StorageRouter::builder().with_store(Arc::new(database)).build()
    }

    #[test]
    fn test_parse_selector_defaults_to_database() {
        assert_eq!(StorageRouter::parse_selector(None).unwrap(), StorageType::Database);
        assert_eq!(StorageRouter::parse_selector(Some("  ")).unwrap(), StorageType::Database);
        assert_eq!(StorageRouter::parse_selector(Some("S3")).unwrap(), StorageType::ObjectStore);
        assert_eq!(
            StorageRouter::parse_selector(Some("cassandra")).unwrap_err().kind(),
            ErrorKind::UnknownBackend
        );
    }

    #[tokio::test]
    async fn test_unconfigured_backend_is_unknown() {
        let router = create_test_router();
        let response = router.get_log_by_id(Some("queue"), 1).await;
        assert!(!response.succeeded);
        assert_eq!(response.error_kind, Some(ErrorKind::UnknownBackend));
        assert_eq!(router.storage_types(), vec![StorageType::Database]);
    }

    #[tokio::test]
    async fn test_store_and_get_messages() {
        let router = create_test_router();
        let stored = router
            .store_log(None, NewLogEntry::new("auth", LogLevel::Info, "ok", Utc::now()))
            .await;
        assert!(stored.succeeded);
        assert_eq!(stored.message, "Log [auth] saved to Database successfully");

        let id = stored.data.unwrap().id.unwrap();
        let fetched = router.get_log_by_id(None, id).await;
        assert_eq!(fetched.message, format!("Log entry with ID {} retrieved successfully.", id));
    }

    #[tokio::test]
    async fn test_invalid_page_is_validation_error() {
        let router = create_test_router();
        let response = router
            .retrieve_logs(None, LogFilter::default(), PageRequest::new(0, 10))
            .await;
        assert!(!response.succeeded);
        assert!(response.data.is_none());
        assert_eq!(response.error_kind, Some(ErrorKind::ValidationError));
    }

    #[tokio::test]
    async fn test_health_and_shutdown() {
        let router = create_test_router();
        router.initialize_all().await.unwrap();
        assert_eq!(router.health().await, vec![(StorageType::Database, true)]);
        router.shutdown().await.unwrap();
    }
}
