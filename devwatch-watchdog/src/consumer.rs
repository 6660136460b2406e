//! Broker consumer feeding the dispatcher.

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, Consumer};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use devwatch_common::broker::declare_exchange;
use devwatch_common::{BrokerConfig, Result};

use crate::config::WatchdogSettings;
use crate::dispatcher::{AckAction, DispatchStats, RoutingDispatcher, ValueHandler};

/// Consumes telemetry from a server-named queue bound to the configured
/// patterns, and settles every delivery individually.
pub struct TelemetryConsumer<H> {
    channel: Channel,
    consumer: Consumer,
    queue: String,
    dispatcher: RoutingDispatcher,
    handler: H,
}

impl<H: ValueHandler> TelemetryConsumer<H> {
    /// Declare the queue and bindings and start consuming.
    ///
    /// The queue is exclusive and deleted when the consumer goes away.
    pub async fn declare(
        connection: &Connection,
        broker: &BrokerConfig,
        settings: &WatchdogSettings,
        handler: H,
    ) -> Result<Self> {
        let channel = connection.create_channel().await?;
        declare_exchange(&channel, &broker.exchange).await?;

        channel
            .basic_qos(settings.prefetch, BasicQosOptions::default())
            .await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let queue = queue.name().as_str().to_string();

        for binding in &settings.bindings {
            channel
                .queue_bind(
                    &queue,
                    &broker.exchange,
                    binding,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            info!(queue = %queue, exchange = %broker.exchange, binding = %binding, "Bound queue");
        }

        let consumer = channel
            .basic_consume(
                &queue,
                &settings.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(Self {
            channel,
            consumer,
            queue,
            dispatcher: RoutingDispatcher::new(),
            handler,
        })
    }

    /// Get the server-assigned queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Get the dispatch statistics.
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.dispatcher.stats()
    }

    /// Consume until the shutdown signal is received or the stream ends.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(queue = %self.queue, "Consumer started, waiting for telemetry...");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping consumer");
                        break;
                    }
                }

                delivery = self.consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => self.handle_delivery(delivery).await?,
                        Some(Err(e)) => {
                            error!(error = %e, "Consumer error");
                            return Err(e.into());
                        }
                        None => {
                            info!("Consumer stream ended");
                            break;
                        }
                    }
                }
            }
        }

        self.channel.close(200, "Watchdog shutting down").await?;
        info!("Consumer stopped");
        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<()> {
        let routing_key = delivery.routing_key.as_str();
        let outcome = self
            .dispatcher
            .dispatch(routing_key, &delivery.data, &self.handler)
            .await;

        let action = outcome.action();
        debug!(
            routing_key = %routing_key,
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
            action = ?action,
            "Settling delivery"
        );
        settle(&delivery, action).await
    }
}

/// Apply an [`AckAction`] to a delivery.
pub async fn settle(delivery: &Delivery, action: AckAction) -> Result<()> {
    match action {
        AckAction::Ack => delivery.ack(BasicAckOptions::default()).await?,
        AckAction::Reject => {
            delivery
                .reject(BasicRejectOptions { requeue: false })
                .await?
        }
        AckAction::Requeue => {
            delivery
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: true,
                })
                .await?
        }
    };
    Ok(())
}

/// What ended the wait in [`wait_for_stop`].
#[derive(Debug)]
pub enum Stop {
    /// A shutdown signal arrived while the consumer was still running.
    Signal(&'static str),
    /// The consumer task finished on its own.
    Consumer(std::result::Result<Result<()>, JoinError>),
}

/// Wait for a shutdown signal or for the consumer task to end, whichever
/// comes first.
pub async fn wait_for_stop<F>(consumer: &mut JoinHandle<Result<()>>, signal: F) -> Stop
where
    F: Future<Output = &'static str>,
{
    tokio::select! {
        name = signal => Stop::Signal(name),
        joined = consumer => Stop::Consumer(joined),
    }
}
