use crate::protocol::LogEntry;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Counters exposed for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub buffered: usize,
    pub received: usize,
    pub evicted: usize,
}

/// Bounded FIFO of consumed queue entries
///
/// Written by the single background consumer, read by any number of
/// retrievals. Reads take a snapshot and never drain. When full, the oldest
/// entry is evicted to make room.
pub struct LogBuffer {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,

    // Arrival sequence, used as the entry id
    last_seq: AtomicU64,

    // Statistics
    total_received: AtomicUsize,
    total_evicted: AtomicUsize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            last_seq: AtomicU64::new(0),
            total_received: AtomicUsize::new(0),
            total_evicted: AtomicUsize::new(0),
        }
    }

    /// Append an entry, stamping its arrival sequence; returns the sequence
    pub async fn push(&self, mut entry: LogEntry) -> u64 {
        let seq = {
            let mut entries = self.entries.write().await;
            let seq = self.last_seq.fetch_add(1, Ordering::AcqRel) + 1;
            entry.id = seq;
            if entries.len() >= self.capacity {
                if let Some(evicted) = entries.pop_front() {
                    self.total_evicted.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Log buffer full ({} entries), evicting entry {} from '{}'",
                        self.capacity, evicted.id, evicted.service
                    );
                }
            }
            entries.push_back(entry);
            seq
        };

        self.total_received.fetch_add(1, Ordering::Relaxed);
        debug!("Buffered queue entry {}", seq);
        seq
    }

    /// Copy of the buffered entries in arrival order
    pub async fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn stats(&self) -> BufferStats {
        BufferStats {
            buffered: self.len().await,
            received: self.total_received.load(Ordering::Relaxed),
            evicted: self.total_evicted.load(Ordering::Relaxed),
        }
    }
}
