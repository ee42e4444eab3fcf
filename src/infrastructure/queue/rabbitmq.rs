use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    acker::Acker, options::*, types::FieldTable, BasicProperties, Channel, Connection,
    ConnectionProperties, Consumer,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::infrastructure::ports::{Delivery, TaskQueue};

const CONSUMER_TAG: &str = "video_analysis_worker";

/// Ackers of in-flight deliveries behind locally issued handles. Broker
/// delivery tags restart on every channel, so after a reconnect a tag alone
/// would ack the wrong message; the acker stays bound to its own channel.
struct PendingAcks<A> {
    last: u64,
    pending: HashMap<u64, A>,
}

impl<A> Default for PendingAcks<A> {
    fn default() -> Self {
        Self {
            last: 0,
            pending: HashMap::new(),
        }
    }
}

impl<A> PendingAcks<A> {
    fn insert(&mut self, acker: A) -> u64 {
        self.last += 1;
        self.pending.insert(self.last, acker);
        self.last
    }

    fn take(&mut self, handle: u64) -> Option<A> {
        self.pending.remove(&handle)
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    queue: String,
    prefetch: u16,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
    consumer: Arc<Mutex<Option<Consumer>>>,
    acks: Arc<Mutex<PendingAcks<Acker>>>,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ at {}", url);
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        info!("Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str, queue: &str, prefetch: u16) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;

        Ok(Self {
            url: url.to_string(),
            queue: queue.to_string(),
            prefetch,
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
            consumer: Arc::new(Mutex::new(None)),
            acks: Arc::new(Mutex::new(PendingAcks::default())),
        })
    }

    async fn reconnect(&self) -> Result<()> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    async fn declare_queue(&self, channel: &Channel) -> Result<()> {
        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue: {}", e))?;
        Ok(())
    }

    async fn publish_internal(&self, payload: &[u8], message_id: &str) -> Result<()> {
        let channel = self.channel.lock().await;

        self.declare_queue(&channel).await?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_message_id(message_id.to_string().into()),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        Ok(())
    }

    async fn start_consumer(&self) -> Result<Consumer> {
        let channel = self.channel.lock().await;

        self.declare_queue(&channel).await?;

        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set prefetch: {}", e))?;

        let consumer = channel
            .basic_consume(
                &self.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        info!("Consuming from '{}' (prefetch {})", self.queue, self.prefetch);
        Ok(consumer)
    }
}

#[async_trait]
impl TaskQueue for RabbitMqService {
    async fn enqueue(&self, payload: &[u8]) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();

        if let Err(e) = self.publish_internal(payload, &message_id).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(payload, &message_id).await?;
        }

        Ok(message_id)
    }

    async fn dequeue(&self) -> Result<Option<Delivery>> {
        let mut guard = self.consumer.lock().await;
        if guard.is_none() {
            let consumer = match self.start_consumer().await {
                Ok(c) => c,
                Err(e) => {
                    warn!("Starting consumer failed: {}. Retrying after reconnect.", e);
                    self.reconnect().await?;
                    self.start_consumer().await?
                }
            };
            *guard = Some(consumer);
        }

        let Some(consumer) = guard.as_mut() else {
            return Ok(None);
        };

        match consumer.next().await {
            Some(Ok(delivery)) => {
                let mut acks = self.acks.lock().await;
                let handle = acks.insert(delivery.acker);
                debug!("{} deliveries awaiting ack", acks.len());
                Ok(Some(Delivery {
                    delivery_tag: handle,
                    payload: delivery.data,
                    redelivered: delivery.redelivered,
                }))
            }
            Some(Err(e)) => {
                // Force a fresh consumer on the next call
                *guard = None;
                Err(anyhow!("Consumer error: {}", e))
            }
            None => Ok(None),
        }
    }

    /// Acks on the channel the delivery came from. If that channel has since
    /// closed, the broker has already requeued the message and this fails.
    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        let Some(acker) = self.acks.lock().await.take(delivery_tag) else {
            return Err(anyhow!("Unknown delivery {}", delivery_tag));
        };

        acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to ack message {}: {}", delivery_tag, e))
    }
}
