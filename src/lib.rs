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

// logvault: pluggable log storage
//
// Stores, filters and pages structured log entries through one of four
// interchangeable backends selected per request:
// - Database (generic repository port)
// - File (one JSON document per root directory)
// - Object store (S3 REST with hand-built request signing)
// - Queue (RabbitMQ, drained by a long-lived background consumer)

pub mod buffer;
pub mod config;
pub mod error;
pub mod filter;
pub mod protocol;
pub mod signing;
pub mod storage;

// Re-export main types
pub use buffer::{BufferStats, LogBuffer};
pub use config::{load_config, load_config_with_env, AppConfig};
pub use error::{ErrorKind, StorageError};
pub use filter::paginate;
pub use protocol::{
    LogEntry, LogFilter, LogLevel, NewLogEntry, Page, PageRequest, Receipt, StorageResponse,
    StorageType,
};
pub use signing::RequestSigner;
pub use storage::{BackendFactory, LogStore, StorageRouter};
