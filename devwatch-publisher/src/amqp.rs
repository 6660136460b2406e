//! AMQP channel backed by `lapin`.

use std::sync::atomic::{AtomicU64, Ordering};

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation as BrokerConfirmation;
use lapin::{BasicProperties, Connection};
use tracing::{debug, warn};

use devwatch_common::CONTENT_TYPE;
use devwatch_common::broker::declare_exchange;

use crate::channel::{Channel, ConfirmChannel, ConfirmSender, ConfirmSignal};
use crate::error::{PublishError, Result};

/// A broker channel publishing to one topic exchange.
///
/// In confirm mode the broker numbers publishes from 1 per channel; this
/// type mirrors that counter and forwards each broker confirmation as a
/// [`ConfirmSignal`].
pub struct AmqpChannel {
    channel: lapin::Channel,
    exchange: String,
    next_sequence: AtomicU64,
    confirmations: Option<ConfirmSender>,
}

impl AmqpChannel {
    /// Open a best-effort channel.
    pub async fn best_effort(connection: &Connection, exchange: &str) -> Result<Self> {
        let channel = connection.create_channel().await?;
        declare_exchange(&channel, exchange)
            .await
            .map_err(|e| PublishError::transport(e.to_string()))?;

        Ok(Self {
            channel,
            exchange: exchange.to_string(),
            next_sequence: AtomicU64::new(1),
            confirmations: None,
        })
    }

    /// Open a channel in publisher-confirm mode.
    ///
    /// Broker confirmations are delivered on `confirmations`.
    pub async fn confirming(
        connection: &Connection,
        exchange: &str,
        confirmations: ConfirmSender,
    ) -> Result<Self> {
        let mut this = Self::best_effort(connection, exchange).await?;
        this.channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        this.confirmations = Some(confirmations);

        debug!(exchange = %exchange, channel_id = this.channel.id(), "Enabled publisher confirms");
        Ok(this)
    }

    /// Get the exchange this channel publishes to.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Close the underlying broker channel.
    pub async fn close(&self) -> Result<()> {
        self.channel.close(200, "closing").await?;
        Ok(())
    }
}

impl Channel for AmqpChannel {
    async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);

        if let Some(confirmations) = self.confirmations.clone() {
            tokio::spawn(async move {
                if let Some(signal) = confirm_signal(sequence, confirm.await) {
                    let _ = confirmations.send(signal);
                }
            });
        }

        Ok(())
    }
}

/// Translate a broker confirmation into a signal for the publisher.
///
/// Only an explicit broker nack becomes a nack. A confirmation lost with
/// the channel yields nothing, so the entry stays pending until the broker
/// resolves it after reconnecting or the publisher is closed.
fn confirm_signal(
    sequence: u64,
    confirmation: lapin::Result<BrokerConfirmation>,
) -> Option<ConfirmSignal> {
    match confirmation {
        Ok(BrokerConfirmation::Ack(_)) => Some(ConfirmSignal::ack(sequence, false)),
        Ok(BrokerConfirmation::Nack(_)) => Some(ConfirmSignal::nack(sequence, false)),
        Ok(BrokerConfirmation::NotRequested) => None,
        Err(e) => {
            warn!(sequence, error = %e, "Confirmation lost with the channel, keeping publish pending");
            None
        }
    }
}

impl ConfirmChannel for AmqpChannel {
    fn next_publish_seq_no(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }
}
