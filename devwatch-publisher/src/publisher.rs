//! Confirm-tracked telemetry publisher.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use devwatch_common::{SystemValue, build_key, envelope, validate_device_identifier};

use crate::channel::{Channel, ConfirmChannel, ConfirmReceiver, Confirmation};
use crate::error::{PublishError, Result};
use crate::pending::{PendingPublish, PendingSet};

/// Largest encoded envelope accepted by default (128 KiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 128 * 1024;

#[derive(Debug, Default)]
struct State {
    pending: PendingSet,
    last_sequence: u64,
    closed: bool,
}

/// Publisher that guarantees confirm-tracked values are never silently lost.
///
/// Confirm-tracked values go to `confirm` and stay pending until the broker
/// acknowledges them. A negative acknowledgement resends the value once under
/// a fresh sequence number. Everything else goes to `best_effort` untracked.
///
/// One lock guards the pending set and is held from reading the next
/// sequence number until the entry is recorded, so confirmations racing with
/// a send always observe the entry.
#[derive(Debug)]
pub struct ReliablePublisher<C, D = C> {
    confirm: C,
    best_effort: D,
    state: Mutex<State>,
    max_payload_bytes: usize,
    stats: PublisherStats,
}

impl<C: ConfirmChannel, D: Channel> ReliablePublisher<C, D> {
    /// Create a publisher over a confirm-mode channel and a best-effort channel.
    pub fn new(confirm: C, best_effort: D) -> Self {
        Self {
            confirm,
            best_effort,
            state: Mutex::new(State::default()),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            stats: PublisherStats::default(),
        }
    }

    /// Set the largest encoded envelope accepted.
    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    /// Publish a value for a device.
    ///
    /// Returns the sequence number for confirm-tracked publishes, `None`
    /// otherwise. A transport failure leaves existing pending entries as
    /// they were.
    pub async fn publish(
        &self,
        device: &str,
        value: &SystemValue,
        confirm: bool,
    ) -> Result<Option<u64>> {
        validate_device_identifier(device)?;

        let routing_key = build_key(device, value);
        let payload = envelope::encode(value);
        if payload.len() > self.max_payload_bytes {
            return Err(PublishError::encoding(format!(
                "Envelope for {} is {} bytes, limit is {}",
                routing_key,
                payload.len(),
                self.max_payload_bytes
            )));
        }

        if !confirm {
            if self.state.lock().await.closed {
                return Err(PublishError::transport("Publisher is closed"));
            }
            self.best_effort.publish(&routing_key, payload).await?;
            self.stats.published.fetch_add(1, Ordering::Relaxed);
            trace!(routing_key = %routing_key, "Published best-effort");
            return Ok(None);
        }

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(PublishError::transport("Publisher is closed"));
        }

        let sequence = self.confirm.next_publish_seq_no();
        if sequence <= state.last_sequence {
            return Err(PublishError::transport(format!(
                "Channel issued sequence {} after {}",
                sequence, state.last_sequence
            )));
        }

        self.confirm.publish(&routing_key, payload).await?;

        state.last_sequence = sequence;
        state.pending.insert(PendingPublish {
            sequence,
            routing_key: routing_key.clone(),
            payload: value.clone(),
            device_identifier: device.to_string(),
        });
        drop(state);

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        self.stats.confirmed.fetch_add(1, Ordering::Relaxed);
        trace!(sequence, routing_key = %routing_key, "Published with confirm");

        Ok(Some(sequence))
    }

    /// Resolve a positive acknowledgement.
    pub async fn on_ack(&self, tag: u64, multiple: bool) {
        let resolved = self.state.lock().await.pending.resolve(tag, multiple);

        if resolved.is_empty() {
            debug!(tag, multiple, "Ack for unknown sequence");
            return;
        }

        self.stats
            .acked
            .fetch_add(resolved.len() as u64, Ordering::Relaxed);
        trace!(tag, multiple, count = resolved.len(), "Acked");
    }

    /// Resolve a negative acknowledgement by resending every covered value.
    ///
    /// Entries leave the pending set under the lock; resends happen after it
    /// is released, in ascending order of the original sequences.
    pub async fn on_nack(&self, tag: u64, multiple: bool) {
        let resolved = self.state.lock().await.pending.resolve(tag, multiple);

        if resolved.is_empty() {
            debug!(tag, multiple, "Nack for unknown sequence");
            return;
        }

        self.stats
            .nacked
            .fetch_add(resolved.len() as u64, Ordering::Relaxed);

        for entry in resolved {
            match self
                .publish(&entry.device_identifier, &entry.payload, true)
                .await
            {
                Ok(new_sequence) => {
                    self.stats.resent.fetch_add(1, Ordering::Relaxed);
                    info!(
                        device = %entry.device_identifier,
                        routing_key = %entry.routing_key,
                        old_sequence = entry.sequence,
                        new_sequence = ?new_sequence,
                        "Resent nacked value"
                    );
                }
                Err(e) => {
                    self.stats.resend_failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        device = %entry.device_identifier,
                        routing_key = %entry.routing_key,
                        sequence = entry.sequence,
                        error = %e,
                        "Failed to resend nacked value"
                    );
                }
            }
        }
    }

    /// Apply confirmations from the broker until the stream ends.
    pub async fn run_confirmations(&self, mut confirmations: ConfirmReceiver) {
        while let Some(signal) = confirmations.recv().await {
            match signal.confirmation {
                Confirmation::Ack => self.on_ack(signal.tag, signal.multiple).await,
                Confirmation::Nack => self.on_nack(signal.tag, signal.multiple).await,
            }
        }
        debug!("Confirmation stream ended");
    }

    /// Stop publishing and abandon everything still pending.
    ///
    /// Returns the number of abandoned entries. Later publishes fail and
    /// later nacks resend nothing.
    pub async fn close(&self) -> usize {
        let abandoned = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.pending.drain()
        };

        for entry in &abandoned {
            warn!(
                device = %entry.device_identifier,
                routing_key = %entry.routing_key,
                sequence = entry.sequence,
                "Abandoning unconfirmed publish"
            );
        }

        self.stats
            .abandoned
            .fetch_add(abandoned.len() as u64, Ordering::Relaxed);
        abandoned.len()
    }

    /// Sequences still awaiting confirmation, ascending.
    pub async fn pending_sequences(&self) -> Vec<u64> {
        self.state.lock().await.pending.sequences()
    }

    /// Number of publishes still awaiting confirmation.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Whether [`close`](Self::close) has been called.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Get the publisher statistics.
    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// Get the confirm-mode channel.
    pub fn confirm_channel(&self) -> &C {
        &self.confirm
    }

    /// Get the best-effort channel.
    pub fn best_effort_channel(&self) -> &D {
        &self.best_effort
    }
}

/// Publisher statistics.
#[derive(Debug, Default)]
pub struct PublisherStats {
    /// Values handed to a channel successfully.
    pub published: AtomicU64,
    /// Of those, values sent confirm-tracked.
    pub confirmed: AtomicU64,
    /// Pending entries resolved by an ack.
    pub acked: AtomicU64,
    /// Pending entries resolved by a nack.
    pub nacked: AtomicU64,
    /// Nacked values resent.
    pub resent: AtomicU64,
    /// Nacked values whose resend failed.
    pub resend_failed: AtomicU64,
    /// Pending entries dropped on close.
    pub abandoned: AtomicU64,
}

impl PublisherStats {
    /// Get current statistics.
    pub fn snapshot(&self) -> PublisherStatsSnapshot {
        PublisherStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            resent: self.resent.load(Ordering::Relaxed),
            resend_failed: self.resend_failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of publisher statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStatsSnapshot {
    pub published: u64,
    pub confirmed: u64,
    pub acked: u64,
    pub nacked: u64,
    pub resent: u64,
    pub resend_failed: u64,
    pub abandoned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryChannel;
    use devwatch_common::{Cpu, Ram, ServiceEvent};

    fn publisher() -> ReliablePublisher<MemoryChannel> {
        ReliablePublisher::new(MemoryChannel::new(), MemoryChannel::new())
    }

    fn ram(used_mb: u32) -> SystemValue {
        SystemValue::from(Ram {
            used_mb,
            total_mb: 1024,
            memory_clock: 2400,
        })
    }

    #[tokio::test]
    async fn test_best_effort_is_untracked() {
        let publisher = publisher();

        let result = publisher.publish("device-0", &ram(1), false).await.unwrap();

        assert_eq!(result, None);
        assert_eq!(publisher.pending_len().await, 0);
        assert_eq!(publisher.best_effort_channel().published().len(), 1);
        assert!(publisher.confirm_channel().published().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_publish_is_tracked() {
        let publisher = publisher();

        let first = publisher.publish("device-0", &ram(1), true).await.unwrap();
        let second = publisher.publish("device-0", &ram(2), true).await.unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
        assert_eq!(publisher.pending_sequences().await, vec![1, 2]);

        let sent = publisher.confirm_channel().published();
        assert_eq!(sent[0].routing_key, "device-0.metrics.ram");
        assert_eq!(sent[0].sequence, 1);
    }

    #[tokio::test]
    async fn test_cumulative_ack() {
        let publisher = publisher();
        for i in 0..5 {
            publisher.publish("device-0", &ram(i), true).await.unwrap();
        }

        publisher.on_ack(3, true).await;

        assert_eq!(publisher.pending_sequences().await, vec![4, 5]);
        assert_eq!(publisher.stats().snapshot().acked, 3);
    }

    #[tokio::test]
    async fn test_single_ack_out_of_order() {
        let publisher = publisher();
        for i in 0..3 {
            publisher.publish("device-0", &ram(i), true).await.unwrap();
        }

        publisher.on_ack(2, false).await;

        assert_eq!(publisher.pending_sequences().await, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_unknown_ack_is_ignored() {
        let publisher = publisher();
        publisher.publish("device-0", &ram(1), true).await.unwrap();

        publisher.on_ack(42, false).await;

        assert_eq!(publisher.pending_sequences().await, vec![1]);
        assert_eq!(publisher.stats().snapshot().acked, 0);
    }

    #[tokio::test]
    async fn test_nack_resends_with_fresh_sequence() {
        let publisher = publisher();
        let event = SystemValue::from(ServiceEvent::stopped("sshd"));
        let sequence = publisher
            .publish("device-7", &event, true)
            .await
            .unwrap()
            .unwrap();

        publisher.on_nack(sequence, false).await;

        let pending = publisher.pending_sequences().await;
        assert_eq!(pending, vec![2]);

        let sent = publisher.confirm_channel().published();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].sequence, 2);
        assert_eq!(sent[1].routing_key, "device-7.events.service.stopped");
        assert_eq!(sent[1].payload, sent[0].payload);
        assert_eq!(publisher.stats().snapshot().resent, 1);
    }

    #[tokio::test]
    async fn test_cumulative_nack_resends_in_order() {
        let publisher = publisher();
        for i in 1..=4 {
            publisher.publish("device-0", &ram(i), true).await.unwrap();
        }

        publisher.on_nack(3, true).await;

        // 4 untouched, 1..=3 resent as 5, 6, 7 in original order.
        assert_eq!(publisher.pending_sequences().await, vec![4, 5, 6, 7]);

        let sent = publisher.confirm_channel().published();
        let resent: Vec<SystemValue> = sent[4..]
            .iter()
            .map(|m| envelope::decode(&m.payload, devwatch_common::Kind::Ram).unwrap())
            .collect();
        assert_eq!(resent, vec![ram(1), ram(2), ram(3)]);
    }

    #[tokio::test]
    async fn test_invalid_device_is_encoding_error() {
        let publisher = publisher();

        for device in ["", "host.local", "Device", "a b"] {
            let result = publisher.publish(device, &ram(1), true).await;
            assert!(
                matches!(result, Err(PublishError::Encoding(_))),
                "device {:?}",
                device
            );
        }
        assert!(publisher.confirm_channel().published().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_encoding_error() {
        let publisher = publisher().with_max_payload_bytes(16);
        let cpu = SystemValue::from(Cpu {
            load_percentage: 1,
            power_draw: 1,
            core_temps: vec![50; 64],
        });

        let result = publisher.publish("device-0", &cpu, true).await;

        assert!(matches!(result, Err(PublishError::Encoding(_))));
        assert_eq!(publisher.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_pending() {
        let publisher = publisher();
        publisher.publish("device-0", &ram(1), true).await.unwrap();

        publisher.confirm_channel().set_failing(true);
        let result = publisher.publish("device-0", &ram(2), true).await;

        assert!(matches!(result, Err(PublishError::Transport(_))));
        assert_eq!(publisher.pending_sequences().await, vec![1]);

        // The failed attempt did not consume a sequence.
        publisher.confirm_channel().set_failing(false);
        let next = publisher.publish("device-0", &ram(3), true).await.unwrap();
        assert_eq!(next, Some(2));
    }

    #[tokio::test]
    async fn test_failed_resend_is_counted() {
        let publisher = publisher();
        publisher.publish("device-0", &ram(1), true).await.unwrap();

        publisher.confirm_channel().set_failing(true);
        publisher.on_nack(1, false).await;

        let stats = publisher.stats().snapshot();
        assert_eq!(stats.nacked, 1);
        assert_eq!(stats.resent, 0);
        assert_eq!(stats.resend_failed, 1);
        assert_eq!(publisher.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_connection_loss_keeps_pending_until_broker_nack() {
        let publisher = publisher();
        for i in 1..=2 {
            publisher.publish("device-0", &ram(i), true).await.unwrap();
        }

        // Connection drops: confirmations are lost and publishing fails.
        publisher.confirm_channel().set_failing(true);
        let (tx, rx) = crate::channel::confirm_stream();
        drop(tx);
        publisher.run_confirmations(rx).await;
        assert!(publisher.publish("device-0", &ram(3), true).await.is_err());

        assert_eq!(publisher.pending_sequences().await, vec![1, 2]);
        assert_eq!(publisher.stats().snapshot().nacked, 0);

        // Reconnected broker nacks explicitly.
        publisher.confirm_channel().set_failing(false);
        publisher.on_nack(2, true).await;

        assert_eq!(publisher.pending_sequences().await, vec![3, 4]);
        assert_eq!(publisher.stats().snapshot().resent, 2);
    }

    #[tokio::test]
    async fn test_close_abandons_pending() {
        let publisher = publisher();
        for i in 0..3 {
            publisher.publish("device-0", &ram(i), true).await.unwrap();
        }

        assert_eq!(publisher.close().await, 3);
        assert!(publisher.is_closed().await);
        assert_eq!(publisher.stats().snapshot().abandoned, 3);

        // Nothing is resent after close.
        publisher.on_nack(3, true).await;
        assert_eq!(publisher.confirm_channel().published().len(), 3);

        let result = publisher.publish("device-0", &ram(9), false).await;
        assert!(matches!(result, Err(PublishError::Transport(_))));
    }

    #[tokio::test]
    async fn test_run_confirmations() {
        let publisher = publisher();
        for i in 0..4 {
            publisher.publish("device-0", &ram(i), true).await.unwrap();
        }

        let (tx, rx) = crate::channel::confirm_stream();
        tx.send(crate::ConfirmSignal::ack(2, true)).unwrap();
        tx.send(crate::ConfirmSignal::nack(4, false)).unwrap();
        drop(tx);

        publisher.run_confirmations(rx).await;

        assert_eq!(publisher.pending_sequences().await, vec![3, 5]);
    }
}
