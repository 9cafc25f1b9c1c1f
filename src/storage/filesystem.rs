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

// Filesystem backend: one JSON document holding every entry
//
// Writes are whole-document read-modify-write cycles. Within a process they are
// serialized by an async mutex keyed by document path; across processes by an
// exclusive advisory lock on `<document>.lock` held for the whole cycle. The
// new document is written to a temporary sibling and renamed over the old one,
// so readers run without either lock and never observe a partial document.

use super::backend::{saved_message, LogStore, StorageResult};
use crate::config::FileStoreConfig;
use crate::error::StorageError;
use crate::filter::paginate;
use crate::protocol::{LogEntry, LogFilter, NewLogEntry, Page, PageRequest, Receipt, StorageType};
use async_trait::async_trait;
use dashmap::DashMap;
use fs4::fs_std::FileExt;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Root used when the configured path for the current OS is blank
pub const DEFAULT_ROOT: &str = "/var/logs/distributed_system";

static DOCUMENT_LOCKS: LazyLock<DashMap<PathBuf, Arc<Mutex<()>>>> = LazyLock::new(DashMap::new);

fn document_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Arc::clone(&DOCUMENT_LOCKS.entry(key).or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Linux,
    Other(&'static str),
}

impl OsFamily {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => OsFamily::Windows,
            "linux" => OsFamily::Linux,
            other => OsFamily::Other(other),
        }
    }
}

/// Pick the configured root for `os`
pub fn resolve_root(config: &FileStoreConfig, os: OsFamily) -> StorageResult<PathBuf> {
    let configured = match os {
        OsFamily::Windows => &config.windows_path,
        OsFamily::Linux => &config.linux_path,
        OsFamily::Other(name) => {
            return Err(StorageError::UnsupportedPlatform(format!(
                "no file storage root is defined for '{}'",
                name
            )))
        }
    };

    if configured.trim().is_empty() {
        Ok(PathBuf::from(DEFAULT_ROOT))
    } else {
        Ok(PathBuf::from(configured.trim()))
    }
}

pub struct FileStore {
    root: PathBuf,
    document: PathBuf,
}

impl FileStore {
    pub fn new(config: &FileStoreConfig) -> StorageResult<Self> {
        let root = resolve_root(config, OsFamily::current())?;
        Ok(Self::with_root(root, &config.file_name))
    }

    pub fn with_root(root: impl Into<PathBuf>, file_name: &str) -> Self {
        let root = root.into();
        let document = root.join(file_name);

        info!("Initializing file store at: {}", document.display());

        Self { root, document }
    }

    pub fn document_path(&self) -> &Path {
        &self.document
    }

    /// Sibling file carrying the cross-process write lock
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(format!("{}.lock", self.file_name()))
    }

    /// Block until this process holds the exclusive lock on `lock_path`
    ///
    /// The lock is released when the returned handle is dropped.
    async fn lock_document(&self) -> StorageResult<std::fs::File> {
        self.ensure_root().await?;
        let path = self.lock_path();

        let locked = tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("lock task failed: {}", e)))?;

        locked.map_err(|e| {
            error!("Failed to lock {}: {}", self.lock_path().display(), e);
            StorageError::BackendUnavailable(format!(
                "failed to lock {}: {}",
                self.lock_path().display(),
                e
            ))
        })
    }

    /// Ensure root directory exists
    async fn ensure_root(&self) -> StorageResult<()> {
        if fs::metadata(&self.root).await.is_ok() {
            return Ok(());
        }

        debug!("Creating root directory: {}", self.root.display());
        fs::create_dir_all(&self.root).await.map_err(|e| {
            error!("Failed to create directory {}: {}", self.root.display(), e);
            StorageError::DirectoryCreation {
                path: self.root.display().to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Load the whole document; a missing document is an empty store
    async fn load(&self) -> StorageResult<Vec<LogEntry>> {
        self.ensure_root().await?;

        let content = match fs::read_to_string(&self.document).await {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::BackendUnavailable(format!(
                    "failed to read {}: {}",
                    self.document.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            StorageError::Serialization(format!(
                "malformed log document {}: {}",
                self.document.display(),
                e
            ))
        })
    }

    /// Replace the document atomically
    async fn save(&self, entries: &[LogEntry]) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", self.file_name(), Uuid::new_v4()));

        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &self.document).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::PersistenceFailure(format!(
                "failed to write {}: {}",
                self.document.display(),
                e
            )));
        }

        debug!("Wrote {} entries to {}", entries.len(), self.document.display());
        Ok(())
    }

    fn file_name(&self) -> String {
        self.document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "logs.json".to_string())
    }
}

#[async_trait]
impl LogStore for FileStore {
    async fn initialize(&self) -> StorageResult<()> {
        self.ensure_root().await
    }

    async fn store(&self, entry: NewLogEntry) -> StorageResult<Receipt> {
        entry.validate()?;

        let lock = document_lock(&self.document);
        let _guard = lock.lock().await;
        let _file_lock = self.lock_document().await?;

        let mut entries = self.load().await?;
        let id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        let service = entry.service.clone();
        entries.push(entry.into_entry(id, StorageType::File));
        self.save(&entries).await?;

        let message = saved_message(&service, StorageType::File);
        info!("{} (id={})", message, id);

        Ok(Receipt {
            message,
            id: Some(id),
            object_key: None,
        })
    }

    async fn retrieve(&self, filter: &LogFilter, page: PageRequest) -> StorageResult<Page<LogEntry>> {
        page.validate()?;
        let entries = self.load().await?;
        let result = paginate(entries, filter, page);

        info!(
            "Retrieved {} log entries on page {} of {} total logs",
            result.items.len(),
            page.index,
            result.total_count
        );

        Ok(result)
    }

    async fn get_by_id(&self, id: u64) -> StorageResult<LogEntry> {
        self.load()
            .await?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("Log entry with ID {} not found.", id)))
    }

    async fn health_check(&self) -> bool {
        // Check if root directory is accessible and writable
        match fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => {
                let marker = self.root.join(".health_check_test");
                match fs::File::create(&marker).await {
                    Ok(mut f) => {
                        if let Err(e) = f.write_all(b"test").await {
                            warn!("Health check failed - cannot write: {}", e);
                            return false;
                        }
                        let _ = fs::remove_file(&marker).await;
                        true
                    }
                    Err(e) => {
                        warn!("Health check failed - cannot create file: {}", e);
                        false
                    }
                }
            }
            Ok(_) => {
                warn!(
                    "Health check failed - root is not a directory: {}",
                    self.root.display()
                );
                false
            }
            Err(e) => {
                warn!(
                    "Health check failed - cannot access root {}: {}",
                    self.root.display(),
                    e
                );
                false
            }
        }
    }

    fn storage_type(&self) -> StorageType {
        StorageType::File
    }
}
