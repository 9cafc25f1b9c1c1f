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

// Storage backend module
//
// One `LogStore` contract with four implementations (database, file,
// object store, queue) and a router that dispatches on a backend selector.

pub mod backend;
pub mod broker;
pub mod database;
pub mod factory;
pub mod filesystem;
pub mod object_store;
pub mod queue;
pub mod repository;
pub mod router;

pub use backend::{saved_message, with_retry, LogStore, StorageResult};
pub use broker::{AmqpBroker, InMemoryBroker, InboundMessage, MessageBroker, MessageStream};
pub use database::DatabaseStore;
pub use factory::BackendFactory;
pub use filesystem::{resolve_root, FileStore, OsFamily, DEFAULT_ROOT};
pub use object_store::{format_line, object_key, parse_line, ObjectStore, ObjectSummary};
pub use queue::QueueStore;
pub use repository::{InMemoryLogRepository, LogQuery, LogRepository, QueryRows};
pub use router::{StorageRouter, StorageRouterBuilder};
