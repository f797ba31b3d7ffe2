use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use super::{record_delivery, record_publish, Topology};
use crate::{
    config,
    core::{
        envelope::{Lane, RequestEnvelope},
        error::BridgeResult,
        traits::{DeliveryHandler, MessageBroker},
    },
    transport_error,
};

const PERSISTENT: u8 = 2;
const CONTENT_TYPE_JSON: &str = "application/json";

/// Publish side keeps one cached connection; consumers open their own.
struct PublishLink {
    _connection: Connection,
    channel: Channel,
}

/// AMQP 0-9-1 transport backed by lapin.
pub struct AmqpBroker {
    url: String,
    consumer_tag: String,
    topology: Topology,
    link: Mutex<Option<PublishLink>>,
}

impl AmqpBroker {
    pub fn new(cfg: &config::Broker) -> Self {
        Self {
            url: cfg.url.clone(),
            consumer_tag: cfg.consumer_tag.clone(),
            topology: Topology::from(cfg),
            link: Mutex::new(None),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    async fn open_channel(&self) -> BridgeResult<(Connection, Channel)> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| transport_error!("Failed to connect to broker: {}", e))?;
        let channel = connection.create_channel().await?;
        Ok((connection, channel))
    }

    async fn declare_exchange(&self, channel: &Channel) -> BridgeResult<()> {
        channel
            .exchange_declare(
                &self.topology.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn declare_queue(
        &self,
        channel: &Channel,
        queue: &str,
        routing_key: &str,
    ) -> BridgeResult<()> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                queue,
                &self.topology.exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn declare_all(&self, channel: &Channel) -> BridgeResult<()> {
        self.declare_exchange(channel).await?;
        for (queue, routing_key) in self.topology.bindings() {
            self.declare_queue(channel, queue, routing_key).await?;
        }
        Ok(())
    }

    async fn connect_publisher(&self) -> BridgeResult<PublishLink> {
        let (connection, channel) = self.open_channel().await?;
        self.declare_all(&channel).await?;
        info!("Connected publisher to broker");
        Ok(PublishLink {
            _connection: connection,
            channel,
        })
    }

    async fn try_publish(&self, lane: Lane, envelope: &RequestEnvelope) -> BridgeResult<()> {
        let payload = envelope.to_json()?;
        let mut link = self.link.lock().await;

        let stale = link
            .as_ref()
            .map_or(true, |l| !l.channel.status().connected());
        if stale {
            // one lazy reconnect, no retry loop
            debug!("Publisher channel missing or closed, reconnecting");
            *link = Some(self.connect_publisher().await?);
        }

        let channel = match link.as_ref() {
            Some(l) => &l.channel,
            None => return Err(transport_error!("publisher channel unavailable")),
        };

        let publish = channel
            .basic_publish(
                &self.topology.exchange,
                lane.routing_key(),
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT)
                    .with_content_type(CONTENT_TYPE_JSON.into()),
            )
            .await;

        if let Err(e) = publish {
            // drop the broken link so the next publish reconnects
            *link = None;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn declare_topology(&self) -> BridgeResult<()> {
        let (connection, channel) = self.open_channel().await?;
        self.declare_all(&channel).await?;
        if let Err(e) = connection.close(200, "topology declared").await {
            warn!("Failed to close topology connection cleanly: {e}");
        }
        info!(
            "Declared exchange '{}' with queues '{}' and '{}'",
            self.topology.exchange, self.topology.knowledge_queue, self.topology.action_queue
        );
        Ok(())
    }

    async fn publish(&self, lane: Lane, envelope: &RequestEnvelope) -> bool {
        match self.try_publish(lane, envelope).await {
            Ok(()) => {
                info!(
                    "Envelope '{}' published to {lane} lane",
                    envelope.correlation_id
                );
                record_publish(lane, true);
                true
            }
            Err(e) => {
                error!("Failed to publish envelope '{}': {e}", envelope.correlation_id);
                record_publish(lane, false);
                false
            }
        }
    }

    async fn consume(&self, lane: Lane, handler: Arc<dyn DeliveryHandler>) -> BridgeResult<()> {
        let queue = self.topology.queue(lane).to_string();
        let (_connection, channel) = self.open_channel().await?;

        self.declare_exchange(&channel).await?;
        self.declare_queue(&channel, &queue, lane.routing_key()).await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let tag = format!("{}-{lane}", self.consumer_tag);
        let mut consumer = channel
            .basic_consume(
                &queue,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!("Started consuming from '{queue}'");

        while let Some(delivery) = consumer.next().await {
            let delivery =
                delivery.map_err(|e| transport_error!("Delivery stream on '{}' failed: {}", queue, e))?;

            let outcome = match RequestEnvelope::from_json(&delivery.data) {
                Ok(envelope) => handler.handle(envelope).await,
                Err(e) => Err(e.into()),
            };

            match outcome {
                Ok(()) => {
                    delivery.acker.ack(BasicAckOptions::default()).await?;
                    record_delivery(lane, true);
                }
                Err(e) => {
                    error!("Error processing delivery on '{queue}': {e}");
                    delivery
                        .acker
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..BasicNackOptions::default()
                        })
                        .await?;
                    record_delivery(lane, false);
                }
            }
        }

        Err(transport_error!("Consumer stream on '{}' closed", queue))
    }
}
