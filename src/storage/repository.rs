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

// Relational repository port consumed by the database backend

use crate::protocol::{LogEntry, LogFilter};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Query with predicates and paging pushed down to the engine
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub filter: LogFilter,
    pub offset: usize,
    pub limit: usize,
}

/// Rows for one page plus the match count before paging
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub rows: Vec<LogEntry>,
    pub total: usize,
}

/// Generic CRUD repository with unit-of-work semantics
///
/// `add` stages a row, `commit` makes staged rows durable and reports how many
/// were written.
#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Stage an entry, returning the id it will be committed under
    async fn add(&self, entry: LogEntry) -> Result<u64>;

    /// Returns the number of affected rows
    async fn commit(&self) -> Result<usize>;

    async fn query(&self, query: &LogQuery) -> Result<QueryRows>;

    async fn get_by_id(&self, id: u64) -> Result<Option<LogEntry>>;
}

#[derive(Default)]
struct Table {
    rows: Vec<LogEntry>,
    staged: Vec<LogEntry>,
    last_id: u64,
}

/// Process-local repository; ids come from a sequence starting at 1
#[derive(Default)]
pub struct InMemoryLogRepository {
    table: Mutex<Table>,
}

impl InMemoryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LogRepository for InMemoryLogRepository {
    async fn add(&self, mut entry: LogEntry) -> Result<u64> {
        let mut table = self.table.lock().await;
        table.last_id += 1;
        entry.id = table.last_id;
        table.staged.push(entry);
        Ok(table.last_id)
    }

    async fn commit(&self) -> Result<usize> {
        let mut table = self.table.lock().await;
        let staged = std::mem::take(&mut table.staged);
        let affected = staged.len();
        table.rows.extend(staged);
        Ok(affected)
    }

    async fn query(&self, query: &LogQuery) -> Result<QueryRows> {
        let table = self.table.lock().await;
        let mut total = 0;
        let mut rows = Vec::new();

        for row in table.rows.iter().filter(|row| query.filter.matches(row)) {
            if total >= query.offset && rows.len() < query.limit {
                rows.push(row.clone());
            }
            total += 1;
        }

        Ok(QueryRows { rows, total })
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<LogEntry>> {
        let table = self.table.lock().await;
        Ok(table.rows.iter().find(|row| row.id == id).cloned())
    }
}
