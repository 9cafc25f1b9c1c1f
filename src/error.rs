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

// Error taxonomy shared by every storage backend

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serializable error classification carried in failed responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    UnknownBackend,
    NotSupported,
    BackendUnavailable,
    PersistenceFailure,
    SerializationError,
    UnsupportedPlatform,
    DirectoryCreationError,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unknown storage backend: '{0}'")]
    UnknownBackend(String),

    #[error("{operation} is not supported by the {backend} backend")]
    NotSupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("failed to create directory {path}: {reason}")]
    DirectoryCreation { path: String, reason: String },
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Validation(_) => ErrorKind::ValidationError,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::UnknownBackend(_) => ErrorKind::UnknownBackend,
            StorageError::NotSupported { .. } => ErrorKind::NotSupported,
            StorageError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            StorageError::PersistenceFailure(_) => ErrorKind::PersistenceFailure,
            StorageError::Serialization(_) => ErrorKind::SerializationError,
            StorageError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            StorageError::DirectoryCreation { .. } => ErrorKind::DirectoryCreationError,
        }
    }

    /// Wrap an `anyhow` chain from a collaborator, keeping every context layer
    pub(crate) fn unavailable(err: anyhow::Error) -> Self {
        StorageError::BackendUnavailable(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::BackendUnavailable(format!("request timed out: {}", err))
        } else {
            StorageError::BackendUnavailable(err.to_string())
        }
    }
}
