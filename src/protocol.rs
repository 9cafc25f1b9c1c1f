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

use crate::error::{ErrorKind, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage medium a log entry was written to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StorageType {
    Database,
    File,
    ObjectStore,
    Queue,
}

impl StorageType {
    pub const ALL: [StorageType; 4] = [
        StorageType::Database,
        StorageType::File,
        StorageType::ObjectStore,
        StorageType::Queue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::Database => "Database",
            StorageType::File => "File",
            StorageType::ObjectStore => "ObjectStore",
            StorageType::Queue => "Queue",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(StorageType::Database),
            "file" => Ok(StorageType::File),
            "objectstore" | "object_store" | "s3" => Ok(StorageType::ObjectStore),
            "queue" | "rabbitmq" => Ok(StorageType::Queue),
            _ => Err(StorageError::UnknownBackend(s.to_string())),
        }
    }
}

/// Log severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "Info",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(StorageError::Validation(format!(
                "unknown log level '{}', expected Info, Warning or Error",
                other
            ))),
        }
    }
}

/// Log record as submitted by a client service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLogEntry {
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl NewLogEntry {
    pub fn new(
        service: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            service: service.into(),
            level,
            message: message.into(),
            timestamp,
        }
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.service.trim().is_empty() {
            return Err(StorageError::Validation("service is required".into()));
        }
        if self.message.trim().is_empty() {
            return Err(StorageError::Validation("message is required".into()));
        }
        Ok(())
    }

    /// Stamp backend-assigned fields
    pub fn into_entry(self, id: u64, storage_type: StorageType) -> LogEntry {
        LogEntry {
            id,
            storage_type,
            service: self.service,
            level: self.level,
            message: self.message,
            timestamp: self.timestamp,
            created_date: Utc::now(),
        }
    }
}

/// Persisted log record
///
/// `id` and `created_date` are assigned by the backend on write. Backends
/// without an id index (object store) report `0`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: u64,
    pub storage_type: StorageType,
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub created_date: DateTime<Utc>,
}

/// Query predicates; absent fields are not applied
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// 1-based page coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRequest {
    pub index: usize,
    pub size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { index: 1, size: 10 }
    }
}

impl PageRequest {
    pub fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.index == 0 {
            return Err(StorageError::Validation("page index must be >= 1".into()));
        }
        if self.size == 0 {
            return Err(StorageError::Validation("page size must be >= 1".into()));
        }
        Ok(())
    }

    /// Items skipped before this page; index 0 is treated as page 1
    pub fn offset(&self) -> usize {
        self.index.saturating_sub(1).saturating_mul(self.size)
    }
}

/// A bounded slice of a filtered result set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page_index: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total_count.div_ceil(self.page_size.max(1))
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index < self.total_pages()
    }
}

/// Success payload of a store operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
}

/// Result envelope handed back to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageResponse<T> {
    pub succeeded: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl<T> StorageResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            data: Some(data),
            error_kind: None,
        }
    }

    pub fn failure(error: &StorageError) -> Self {
        Self {
            succeeded: false,
            message: error.to_string(),
            data: None,
            error_kind: Some(error.kind()),
        }
    }
}
