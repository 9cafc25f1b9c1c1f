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

// Message broker port and its adapters

use crate::config::QueueConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type MessageStream = BoxStream<'static, Result<InboundMessage>>;

enum Acker {
    Amqp(lapin::acker::Acker),
    Counter(Arc<AtomicUsize>),
}

/// A delivered message that must be acknowledged once handled
pub struct InboundMessage {
    pub payload: Bytes,
    acker: Acker,
}

impl InboundMessage {
    pub async fn ack(self) -> Result<()> {
        match self.acker {
            Acker::Amqp(acker) => {
                acker
                    .ack(BasicAckOptions::default())
                    .await
                    .context("Failed to ack delivery")?;
            }
            Acker::Counter(acked) => {
                acked.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

/// Publish/subscribe access to a named queue
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<()>;

    /// Attach a manual-ack consumer to `queue`
    async fn subscribe(&self, queue: &str) -> Result<MessageStream>;

    /// Tear down connections and consumer channels
    async fn close(&self) -> Result<()>;

    fn broker_type(&self) -> &str;
}

/// Closes a channel when dropped unless disarmed
///
/// Covers every exit path of a publish or subscribe, including the caller
/// dropping the future on timeout.
struct ChannelGuard(Option<Channel>);

impl ChannelGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        let Some(channel) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = channel.close(200, "OK").await {
                        debug!("Closing channel failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime to close AMQP channel {}", channel.id()),
        }
    }
}

/// RabbitMQ adapter
///
/// The connection is opened once on first use and shared; every publish runs
/// on its own short-lived channel, the consumer keeps one long-lived channel.
/// Channel operations are bounded by `operation_timeout`.
pub struct AmqpBroker {
    uri: String,
    connect_timeout: Duration,
    operation_timeout: Duration,
    prefetch_count: u16,
    connection: Mutex<Option<Arc<Connection>>>,
    consumer_channel: Mutex<Option<Channel>>,
}

impl AmqpBroker {
    pub fn new(config: &QueueConfig) -> Result<Self> {
        info!(
            "Configuring RabbitMQ broker at {}:{}{}",
            config.host, config.port, config.vhost
        );
        Ok(Self {
            uri: config.amqp_uri()?,
            connect_timeout: config.connect_timeout(),
            operation_timeout: config.publish_timeout(),
            prefetch_count: config.prefetch_count,
            connection: Mutex::new(None),
            consumer_channel: Mutex::new(None),
        })
    }

    /// Connect once; later calls reuse the open connection
    pub async fn connect(&self) -> Result<Arc<Connection>> {
        let mut guard = self.connection.lock().await;

        if let Some(connection) = guard.as_ref() {
            if connection.status().connected() {
                return Ok(connection.clone());
            }
            warn!("RabbitMQ connection lost, reconnecting");
        }

        let connection = tokio::time::timeout(
            self.connect_timeout,
            Connection::connect(&self.uri, ConnectionProperties::default()),
        )
        .await
        .map_err(|_| anyhow!("Timed out connecting to RabbitMQ after {:?}", self.connect_timeout))?
        .context("Failed to connect to RabbitMQ")?;

        info!("Connected to RabbitMQ");
        let connection = Arc::new(connection);
        *guard = Some(connection.clone());
        Ok(connection)
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| anyhow!("{} timed out after {:?}", what, self.operation_timeout))?
    }

    async fn open_channel(&self) -> Result<(Channel, ChannelGuard)> {
        let connection = self.connect().await?;
        let channel = self
            .bounded("Opening channel", async {
                connection.create_channel().await.context("Failed to open channel")
            })
            .await?;
        let guard = ChannelGuard(Some(channel.clone()));
        Ok((channel, guard))
    }

    async fn declare(channel: &Channel, queue: &str) -> Result<()> {
        channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .with_context(|| format!("Failed to declare queue '{}'", queue))?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<()> {
        let (channel, guard) = self.open_channel().await?;

        let published = self
            .bounded("Publish", async {
                Self::declare(&channel, queue).await?;
                channel
                    .basic_publish(
                        "",
                        queue,
                        BasicPublishOptions::default(),
                        &payload,
                        BasicProperties::default().with_content_type("application/json".into()),
                    )
                    .await
                    .context("Failed to publish message")?
                    .await
                    .context("Publish was not confirmed")?;
                Ok(())
            })
            .await;

        // Dropping the guard closes the channel
        drop(guard);
        published
    }

    async fn subscribe(&self, queue: &str) -> Result<MessageStream> {
        let (channel, guard) = self.open_channel().await?;

        let consumer_tag = format!("logvault-{}", Uuid::new_v4());
        let consumer = self
            .bounded("Attaching consumer", async {
                channel
                    .basic_qos(self.prefetch_count, BasicQosOptions::default())
                    .await
                    .context("Failed to set prefetch")?;
                Self::declare(&channel, queue).await?;
                channel
                    .basic_consume(
                        queue,
                        &consumer_tag,
                        BasicConsumeOptions::default(),
                        FieldTable::default(),
                    )
                    .await
                    .with_context(|| format!("Failed to consume from '{}'", queue))
            })
            .await?;

        info!("Consumer '{}' attached to queue '{}'", consumer_tag, queue);
        guard.disarm();

        if let Some(previous) = self.consumer_channel.lock().await.replace(channel) {
            drop(ChannelGuard(Some(previous)));
        }

        let stream = consumer.map(|delivery| {
            delivery
                .map(|delivery| InboundMessage {
                    payload: Bytes::from(delivery.data),
                    acker: Acker::Amqp(delivery.acker),
                })
                .map_err(anyhow::Error::from)
        });

        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        if let Some(channel) = self.consumer_channel.lock().await.take() {
            let _ = tokio::time::timeout(self.operation_timeout, channel.close(200, "Shutdown")).await;
        }
        if let Some(connection) = self.connection.lock().await.take() {
            self.bounded("Closing connection", async {
                connection
                    .close(200, "Shutdown")
                    .await
                    .context("Failed to close RabbitMQ connection")
            })
            .await?;
            info!("RabbitMQ connection closed");
        }
        Ok(())
    }

    fn broker_type(&self) -> &str {
        "rabbitmq"
    }
}

struct LocalQueue {
    sender: mpsc::UnboundedSender<Bytes>,
    receiver: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

impl LocalQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: std::sync::Mutex::new(Some(receiver)),
        }
    }
}

/// Process-local broker; messages published before a consumer attaches wait
/// in the queue. Each queue accepts a single consumer.
pub struct InMemoryBroker {
    queues: DashMap<String, Arc<LocalQueue>>,
    acked: Arc<AtomicUsize>,
    available: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self {
            queues: DashMap::new(),
            acked: Arc::new(AtomicUsize::new(0)),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<LocalQueue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(LocalQueue::new()))
            .clone()
    }

    /// Number of acknowledged deliveries
    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::Relaxed)
    }

    /// Simulate an outage: publish and subscribe fail while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.available.load(Ordering::Relaxed) {
            bail!("broker unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<()> {
        self.ensure_available()?;
        self.queue(queue)
            .sender
            .send(payload)
            .map_err(|_| anyhow!("queue '{}' is closed", queue))
    }

    async fn subscribe(&self, queue: &str) -> Result<MessageStream> {
        self.ensure_available()?;
        let receiver = self
            .queue(queue)
            .receiver
            .lock()
            .map_err(|_| anyhow!("queue '{}' lock poisoned", queue))?
            .take()
            .ok_or_else(|| anyhow!("queue '{}' already has a consumer", queue))?;

        let acked = self.acked.clone();
        let stream = stream::unfold(receiver, move |mut receiver| {
            let acked = acked.clone();
            async move {
                let payload = receiver.recv().await?;
                let message = InboundMessage {
                    payload,
                    acker: Acker::Counter(acked),
                };
                Some((Ok(message), receiver))
            }
        });

        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn broker_type(&self) -> &str {
        "in-memory"
    }
}
