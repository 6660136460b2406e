//! In-process channel used by tests and dry runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::channel::{Channel, ConfirmChannel, ConfirmSender, ConfirmSignal};
use crate::error::{PublishError, Result};

/// A message recorded by [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub sequence: u64,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

/// Channel that records publishes instead of sending them.
///
/// Sequence numbers start at 1 and advance only on successful publishes,
/// like a broker channel in confirm mode. With an auto-ack sender attached,
/// every publish is immediately acknowledged.
#[derive(Debug)]
pub struct MemoryChannel {
    next_sequence: AtomicU64,
    failing: AtomicBool,
    recording: bool,
    published: Mutex<Vec<PublishedMessage>>,
    auto_ack: Option<ConfirmSender>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            next_sequence: AtomicU64::new(1),
            failing: AtomicBool::new(false),
            recording: true,
            published: Mutex::new(Vec::new()),
            auto_ack: None,
        }
    }

    /// Acknowledge every successful publish on the given stream.
    pub fn with_auto_ack(mut self, confirmations: ConfirmSender) -> Self {
        self.auto_ack = Some(confirmations);
        self
    }

    /// Log publishes at debug level instead of keeping them.
    pub fn without_recording(mut self) -> Self {
        self.recording = false;
        self
    }

    /// Make subsequent publishes fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages published so far, in publish order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Remove and return the messages published so far.
    pub fn take_published(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut *self.published.lock())
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MemoryChannel {
    async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::transport("Memory channel is failing"));
        }

        let sequence = {
            let mut published = self.published.lock();
            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            if self.recording {
                published.push(PublishedMessage {
                    sequence,
                    routing_key: routing_key.to_string(),
                    payload,
                });
            } else {
                debug!(sequence, routing_key = %routing_key, bytes = payload.len(), "Publish");
            }
            sequence
        };

        if let Some(confirmations) = &self.auto_ack {
            // Receiver gone means nobody tracks confirmations any more.
            let _ = confirmations.send(ConfirmSignal::ack(sequence, false));
        }

        Ok(())
    }
}

impl ConfirmChannel for MemoryChannel {
    fn next_publish_seq_no(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::confirm_stream;

    #[tokio::test]
    async fn test_records_publishes() {
        let channel = MemoryChannel::new();
        assert_eq!(channel.next_publish_seq_no(), 1);

        channel.publish("a.metrics.cpu", vec![1]).await.unwrap();
        channel.publish("b.metrics.ram", vec![2]).await.unwrap();

        assert_eq!(channel.next_publish_seq_no(), 3);
        let published = channel.take_published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].routing_key, "b.metrics.ram");
        assert_eq!(published[1].sequence, 2);
        assert!(channel.published().is_empty());
    }

    #[tokio::test]
    async fn test_failing_does_not_consume_sequence() {
        let channel = MemoryChannel::new();
        channel.set_failing(true);

        assert!(channel.publish("a.metrics.cpu", vec![]).await.is_err());
        assert_eq!(channel.next_publish_seq_no(), 1);
        assert!(channel.published().is_empty());
    }

    #[tokio::test]
    async fn test_without_recording() {
        let channel = MemoryChannel::new().without_recording();

        channel.publish("a.metrics.cpu", vec![1, 2]).await.unwrap();

        assert!(channel.published().is_empty());
        assert_eq!(channel.next_publish_seq_no(), 2);
    }

    #[tokio::test]
    async fn test_auto_ack() {
        let (tx, mut rx) = confirm_stream();
        let channel = MemoryChannel::new().with_auto_ack(tx);

        channel.publish("a.metrics.cpu", vec![]).await.unwrap();

        assert_eq!(rx.recv().await, Some(ConfirmSignal::ack(1, false)));
    }
}
