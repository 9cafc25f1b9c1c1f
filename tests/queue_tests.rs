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

// Queue backend against the in-memory broker

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use logvault::config::QueueConfig;
use logvault::storage::{InMemoryBroker, MessageBroker, MessageStream, QueueStore};
use logvault::{ErrorKind, LogFilter, LogLevel, LogStore, NewLogEntry, PageRequest, StorageRouter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Broker whose calls open a channel and then never complete
#[derive(Default)]
struct StalledBroker {
    open_channels: Arc<AtomicUsize>,
}

struct OpenChannel(Arc<AtomicUsize>);

impl Drop for OpenChannel {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StalledBroker {
    fn open_channel(&self) -> OpenChannel {
        self.open_channels.fetch_add(1, Ordering::SeqCst);
        OpenChannel(self.open_channels.clone())
    }
}

#[async_trait]
impl MessageBroker for StalledBroker {
    async fn publish(&self, _queue: &str, _payload: Bytes) -> anyhow::Result<()> {
        let _channel = self.open_channel();
        std::future::pending().await
    }

    async fn subscribe(&self, _queue: &str) -> anyhow::Result<MessageStream> {
        let _channel = self.open_channel();
        std::future::pending().await
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn broker_type(&self) -> &str {
        "stalled"
    }
}

fn queue_config(capacity: usize) -> QueueConfig {
    QueueConfig {
        queue_name: "test-logs".to_string(),
        buffer_capacity: capacity,
        ..Default::default()
    }
}

async fn wait_for_buffered(store: &QueueStore, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.buffered().await < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("consumer did not catch up");
}

#[tokio::test]
async fn test_messages_published_between_reads_are_not_lost() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = QueueStore::new(broker.clone(), &queue_config(100));
    store.initialize().await.unwrap();

    for i in 0..5 {
        store
            .store(NewLogEntry::new("orders", LogLevel::Info, format!("first {}", i), Utc::now()))
            .await
            .unwrap();
    }
    wait_for_buffered(&store, 5).await;

    let first = store
        .retrieve(&LogFilter::default(), PageRequest::new(1, 100))
        .await
        .unwrap();
    assert_eq!(first.total_count, 5);

    for i in 0..3 {
        store
            .store(NewLogEntry::new("orders", LogLevel::Error, format!("second {}", i), Utc::now()))
            .await
            .unwrap();
    }
    wait_for_buffered(&store, 8).await;

    // Reads do not drain the buffer
    let second = store
        .retrieve(&LogFilter::default(), PageRequest::new(1, 100))
        .await
        .unwrap();
    assert_eq!(second.total_count, 8);
    assert_eq!(second.items[0].message, "first 0");
    assert_eq!(second.items[7].message, "second 2");
    assert_eq!(broker.acked(), 8);

    let errors = store
        .retrieve(
            &LogFilter {
                level: Some(LogLevel::Error),
                ..Default::default()
            },
            PageRequest::new(1, 2),
        )
        .await
        .unwrap();
    assert_eq!(errors.total_count, 3);
    assert_eq!(errors.items.len(), 2);

    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bounded_buffer_keeps_newest() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = QueueStore::new(broker.clone(), &queue_config(4));
    store.initialize().await.unwrap();

    for i in 0..10 {
        store
            .store(NewLogEntry::new("svc", LogLevel::Info, format!("m{}", i), Utc::now()))
            .await
            .unwrap();
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.acked() < 10 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let stats = store.buffer_stats().await;
    assert_eq!(stats.buffered, 4);
    assert_eq!(stats.received, 10);
    assert_eq!(stats.evicted, 6);

    let page = store
        .retrieve(&LogFilter::default(), PageRequest::new(1, 10))
        .await
        .unwrap();
    let messages: Vec<&str> = page.items.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["m6", "m7", "m8", "m9"]);

    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_router_reports_queue_get_by_id_not_supported() {
    let broker = Arc::new(InMemoryBroker::new());
    let router = StorageRouter::builder()
        .with_store(Arc::new(QueueStore::new(broker, &queue_config(10))))
        .build();

    let response = router.get_log_by_id(Some("queue"), 1).await;
    assert!(!response.succeeded);
    assert_eq!(response.error_kind, Some(ErrorKind::NotSupported));

    router.initialize_all().await.unwrap();
    let health = router.health().await;
    assert_eq!(health.len(), 1);
    assert!(health[0].1);

    router.shutdown().await.unwrap();
    assert!(!router.health().await[0].1);
}

#[tokio::test]
async fn test_broker_outage_fails_retrieve_and_store() {
    let broker = Arc::new(InMemoryBroker::new());
    broker.set_available(false);
    let store = QueueStore::new(broker.clone(), &queue_config(10));

    let err = store.initialize().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    let err = store
        .retrieve(&LogFilter::default(), PageRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);

    // Recovers once the broker is back
    broker.set_available(true);
    store
        .store(NewLogEntry::new("svc", LogLevel::Info, "back", Utc::now()))
        .await
        .unwrap();
    store.initialize().await.unwrap();
    wait_for_buffered(&store, 1).await;

    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stalled_broker_calls_time_out_and_release_channels() {
    let broker = Arc::new(StalledBroker::default());
    let config = QueueConfig {
        connect_timeout_seconds: 1,
        publish_timeout_seconds: 1,
        ..queue_config(10)
    };
    let store = QueueStore::new(broker.clone(), &config);

    let started = Instant::now();
    let err = tokio::time::timeout(
        Duration::from_secs(10),
        store.store(NewLogEntry::new("svc", LogLevel::Info, "m", Utc::now())),
    )
    .await
    .expect("publish was not bounded")
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);

    let err = tokio::time::timeout(Duration::from_secs(10), store.initialize())
        .await
        .expect("subscribe was not bounded")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(broker.open_channels.load(Ordering::SeqCst), 0);
    assert!(!store.health_check().await);
}
