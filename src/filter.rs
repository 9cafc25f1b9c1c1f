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

// Filtering and pagination shared by every backend
//
// Predicates run in a fixed order: service substring (case-insensitive),
// level equality, timestamp >= start, timestamp <= end. Backends that cannot
// push predicates down materialize their candidates and call `paginate`.

use crate::protocol::{LogEntry, LogFilter, Page, PageRequest};

impl LogFilter {
    pub fn by_service(service: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            ..Default::default()
        }
    }

    /// Lowercased service needle, `None` when the predicate is skipped
    fn service_needle(&self) -> Option<String> {
        self.service
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.matches_with_needle(entry, self.service_needle().as_deref())
    }

    fn matches_with_needle(&self, entry: &LogEntry, needle: Option<&str>) -> bool {
        if let Some(needle) = needle {
            if !entry.service.to_lowercase().contains(needle) {
                return false;
            }
        }
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }

    /// Keep matching entries in their original order
    pub fn apply<I>(&self, entries: I) -> Vec<LogEntry>
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let needle = self.service_needle();
        entries
            .into_iter()
            .filter(|e| self.matches_with_needle(e, needle.as_deref()))
            .collect()
    }
}

/// Slice an already-filtered result set
pub fn slice_page<T>(matched: Vec<T>, request: PageRequest) -> Page<T> {
    let total_count = matched.len();
    let items = matched
        .into_iter()
        .skip(request.offset())
        .take(request.size)
        .collect();

    Page {
        items,
        total_count,
        page_index: request.index,
        page_size: request.size,
    }
}

/// Filter candidates in memory, then paginate
pub fn paginate<I>(entries: I, filter: &LogFilter, request: PageRequest) -> Page<LogEntry>
where
    I: IntoIterator<Item = LogEntry>,
{
    slice_page(filter.apply(entries), request)
}
