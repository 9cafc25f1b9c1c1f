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

// Queue backend: publish on write, one background consumer feeds a buffer

use super::backend::{saved_message, LogStore, StorageResult};
use super::broker::{InboundMessage, MessageBroker, MessageStream};
use crate::buffer::{BufferStats, LogBuffer};
use crate::config::QueueConfig;
use crate::error::StorageError;
use crate::filter::paginate;
use crate::protocol::{LogEntry, LogFilter, NewLogEntry, Page, PageRequest, Receipt, StorageType};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(30);

struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct QueueStore {
    broker: Arc<dyn MessageBroker>,
    queue_name: String,
    buffer: Arc<LogBuffer>,
    /// Bounds one broker call, connect included
    call_timeout: Duration,
    consumer: Mutex<Option<ConsumerHandle>>,
}

impl QueueStore {
    pub fn new(broker: Arc<dyn MessageBroker>, config: &QueueConfig) -> Self {
        info!(
            "Queue store on '{}' via {} (buffer capacity {})",
            config.queue_name,
            broker.broker_type(),
            config.buffer_capacity
        );
        Self {
            broker,
            queue_name: config.queue_name.clone(),
            buffer: Arc::new(LogBuffer::new(config.buffer_capacity)),
            call_timeout: config.connect_timeout() + config.publish_timeout(),
            consumer: Mutex::new(None),
        }
    }

    /// Attach the background consumer; a no-op once it is running
    pub async fn start_consumer(&self) -> StorageResult<()> {
        let mut consumer = self.consumer.lock().await;
        if consumer.is_some() {
            return Ok(());
        }

        let stream = match tokio::time::timeout(
            self.call_timeout,
            self.broker.subscribe(&self.queue_name),
        )
        .await
        {
            Ok(subscribed) => subscribed.map_err(StorageError::unavailable)?,
            Err(_) => {
                return Err(StorageError::BackendUnavailable(format!(
                    "subscribe to '{}' timed out after {:?}",
                    self.queue_name, self.call_timeout
                )))
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(consume(
            self.broker.clone(),
            self.queue_name.clone(),
            self.buffer.clone(),
            stream,
            shutdown_rx,
        ));

        info!("Background consumer started on '{}'", self.queue_name);
        *consumer = Some(ConsumerHandle { shutdown, task });
        Ok(())
    }

    /// Number of entries currently held by the consumer buffer
    pub async fn buffered(&self) -> usize {
        self.buffer.len().await
    }

    pub async fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats().await
    }

    async fn consumer_running(&self) -> bool {
        match self.consumer.lock().await.as_ref() {
            Some(handle) => !handle.task.is_finished(),
            None => false,
        }
    }
}

async fn consume(
    broker: Arc<dyn MessageBroker>,
    queue_name: String,
    buffer: Arc<LogBuffer>,
    mut stream: MessageStream,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = stream.next() => match next {
                Some(Ok(message)) => handle_message(&buffer, message).await,
                Some(Err(e)) => warn!("Delivery error on '{}': {:#}", queue_name, e),
                None => {
                    warn!("Consumer stream on '{}' ended, resubscribing", queue_name);
                    match resubscribe(broker.as_ref(), &queue_name, &mut shutdown).await {
                        Some(next_stream) => stream = next_stream,
                        None => break,
                    }
                }
            }
        }
    }
    debug!("Consumer on '{}' stopped", queue_name);
}

/// Subscribe again with backoff; `None` when shutdown was requested first
async fn resubscribe(
    broker: &dyn MessageBroker,
    queue_name: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<MessageStream> {
    let mut delay = Duration::from_millis(100);
    loop {
        tokio::select! {
            _ = shutdown.changed() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
        match broker.subscribe(queue_name).await {
            Ok(stream) => {
                info!("Resubscribed to '{}'", queue_name);
                return Some(stream);
            }
            Err(e) => {
                error!("Resubscribe to '{}' failed: {:#}", queue_name, e);
                delay = (delay * 2).min(RESUBSCRIBE_MAX_DELAY);
            }
        }
    }
}

async fn handle_message(buffer: &LogBuffer, message: InboundMessage) {
    match serde_json::from_slice::<LogEntry>(&message.payload) {
        Ok(entry) => {
            buffer.push(entry).await;
        }
        Err(e) => {
            // Poison messages are acknowledged so they are not redelivered
            warn!(
                "Dropping undecodable message ({} bytes): {}",
                message.payload.len(),
                e
            );
        }
    }

    if let Err(e) = message.ack().await {
        error!("Failed to ack message: {:#}", e);
    }
}

#[async_trait]
impl LogStore for QueueStore {
    async fn initialize(&self) -> StorageResult<()> {
        self.start_consumer().await
    }

    async fn store(&self, entry: NewLogEntry) -> StorageResult<Receipt> {
        entry.validate()?;
        let service = entry.service.clone();
        let payload = Bytes::from(serde_json::to_vec(&entry.into_entry(0, StorageType::Queue))?);

        match tokio::time::timeout(
            self.call_timeout,
            self.broker.publish(&self.queue_name, payload),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(StorageError::unavailable(e)),
            Err(_) => {
                return Err(StorageError::BackendUnavailable(format!(
                    "publish to '{}' timed out after {:?}",
                    self.queue_name, self.call_timeout
                )))
            }
        }

        let message = saved_message(&service, StorageType::Queue);
        info!("{}", message);
        Ok(Receipt {
            message,
            id: None,
            object_key: None,
        })
    }

    async fn retrieve(&self, filter: &LogFilter, page: PageRequest) -> StorageResult<Page<LogEntry>> {
        page.validate()?;
        // Reads never attach a consumer: a consumer that dies with this call
        // would ack messages nobody reads again
        if !self.consumer_running().await {
            return Err(StorageError::BackendUnavailable(format!(
                "no consumer is running on '{}'; initialize the store first",
                self.queue_name
            )));
        }
        let entries = self.buffer.snapshot().await;
        Ok(paginate(entries, filter, page))
    }

    async fn get_by_id(&self, _id: u64) -> StorageResult<LogEntry> {
        Err(StorageError::NotSupported {
            backend: "queue",
            operation: "get_by_id",
        })
    }

    async fn health_check(&self) -> bool {
        self.consumer_running().await
    }

    async fn shutdown(&self) -> StorageResult<()> {
        if let Some(handle) = self.consumer.lock().await.take() {
            let _ = handle.shutdown.send(true);
            if let Err(e) = handle.task.await {
                error!("Consumer task failed: {}", e);
            }
        }
        self.broker.close().await.map_err(StorageError::unavailable)?;
        info!("Queue store on '{}' shut down", self.queue_name);
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Queue
    }
}
