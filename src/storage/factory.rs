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

// Backend factory for creating log stores from configuration

use super::backend::LogStore;
use super::broker::AmqpBroker;
use super::database::DatabaseStore;
use super::filesystem::FileStore;
use super::object_store::ObjectStore;
use super::queue::QueueStore;
use super::repository::InMemoryLogRepository;
use super::router::StorageRouter;
use crate::config::StorageConfig;
use crate::protocol::StorageType;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

pub struct BackendFactory;

impl BackendFactory {
    /// Create one store from configuration
    pub fn create(storage_type: StorageType, config: &StorageConfig) -> Result<Arc<dyn LogStore>> {
        match storage_type {
            StorageType::Database => {
                let repository = Arc::new(InMemoryLogRepository::new());
                Ok(Arc::new(DatabaseStore::new(repository, &config.database)))
            }

            StorageType::File => Ok(Arc::new(FileStore::new(&config.file)?)),

            StorageType::ObjectStore => {
                let object_config = config
                    .object_store
                    .as_ref()
                    .ok_or_else(|| anyhow!("Object store config missing"))?;
                Ok(Arc::new(ObjectStore::new(object_config)?))
            }

            StorageType::Queue => {
                let queue_config = config
                    .queue
                    .as_ref()
                    .ok_or_else(|| anyhow!("Queue config missing"))?;
                let broker = Arc::new(AmqpBroker::new(queue_config)?);
                Ok(Arc::new(QueueStore::new(broker, queue_config)))
            }
        }
    }

    /// Backends that have enough configuration to be built
    pub fn configured(config: &StorageConfig) -> Vec<StorageType> {
        StorageType::ALL
            .into_iter()
            .filter(|t| match t {
                StorageType::Database | StorageType::File => true,
                StorageType::ObjectStore => config.object_store.is_some(),
                StorageType::Queue => config.queue.is_some(),
            })
            .collect()
    }

    /// Build the router over every configured backend
    pub fn build_router(config: &StorageConfig) -> Result<StorageRouter> {
        let mut builder = StorageRouter::builder();
        for storage_type in Self::configured(config) {
            builder = builder.with_store(Self::create(storage_type, config)?);
            info!("Registered {} store", storage_type);
        }
        Ok(builder.build())
    }
}
