//! The real `Bus` backend: AMQP over `lapin` (spec §4.7). Each `consume`
//! call opens its own channel, applies `prefetch` via `basic_qos`, and runs
//! until the channel's delivery stream ends (spec §5: "each consumer opens
//! its own channel"). Deliveries are handled up to `prefetch` at a time —
//! `worker.rs`'s own contract is "a single instance may process multiple
//! file units concurrently up to its configured prefetch" (spec.md §5), so
//! a sequential `while let` loop here would silently cap every worker at
//! one file in flight regardless of its configured prefetch.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions, QueuePurgeOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};
use serde_json::Value;
use tracing::{debug, warn};

use crate::capability::{Bus, HandlerOutcome, MessageHandler};

#[derive(Debug, Clone)]
pub struct AmqpBus {
    conn: Arc<Connection>,
}

impl AmqpBus {
    pub async fn connect(amqp_url: &str) -> Result<Self> {
        let conn = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .with_context(|| format!("connecting to AMQP broker at {amqp_url}"))?;
        Ok(AmqpBus {
            conn: Arc::new(conn),
        })
    }
}

#[async_trait]
impl Bus for AmqpBus {
    async fn declare(&self, queue: &str, durable: bool) -> Result<()> {
        let channel = self.conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("declaring queue {queue}"))?;
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Value, priority: Option<u8>) -> Result<()> {
        let channel = self.conn.create_channel().await?;
        let body = serde_json::to_vec(&payload).context("serializing bus payload")?;
        let mut props = BasicProperties::default().with_delivery_mode(2); // persistent
        if let Some(p) = priority {
            props = props.with_priority(p);
        }
        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &body,
                props,
            )
            .await
            .with_context(|| format!("publishing to {queue}"))?
            .await
            .context("waiting for publisher confirm")?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let channel = self.conn.create_channel().await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .context("setting prefetch")?;

        let consumer_tag = format!("rwxl-{}", uuid::Uuid::new_v4());
        let mut consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("consuming from {queue}"))?;

        // `prefetch == 0` means "unbounded" in AMQP's own `basic_qos`
        // semantics; mirror that for the concurrency limit rather than
        // treating it as zero-concurrency.
        let concurrency = if prefetch == 0 { None } else { Some(prefetch as usize) };

        consumer
            .map_err(anyhow::Error::from)
            .try_for_each_concurrent(concurrency, move |delivery| {
                let handler = handler.clone();
                async move {
                    let payload: Value = match serde_json::from_slice(&delivery.data) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "dropping malformed bus message, nacking without requeue");
                            delivery
                                .nack(BasicNackOptions {
                                    requeue: false,
                                    ..Default::default()
                                })
                                .await
                                .context("nacking malformed message")?;
                            return Ok(());
                        }
                    };

                    match handler.handle(payload).await {
                        HandlerOutcome::Ack => {
                            debug!("acking message");
                            delivery
                                .ack(BasicAckOptions::default())
                                .await
                                .context("acking message")?;
                        }
                        HandlerOutcome::Nack { requeue } => {
                            debug!(requeue, "nacking message");
                            delivery
                                .nack(BasicNackOptions {
                                    requeue,
                                    ..Default::default()
                                })
                                .await
                                .context("nacking message")?;
                        }
                    }
                    Ok(())
                }
            })
            .await
    }

    async fn purge(&self, queue: &str) -> Result<()> {
        let channel = self.conn.create_channel().await?;
        channel
            .queue_purge(queue, QueuePurgeOptions::default())
            .await
            .with_context(|| format!("purging queue {queue}"))?;
        Ok(())
    }
}
