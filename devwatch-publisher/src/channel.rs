//! Transport seams for the publisher.
//!
//! A [`Channel`] sends an already encoded envelope under a routing key. A
//! [`ConfirmChannel`] additionally numbers every publish so the broker can
//! later acknowledge it; those numbers come back as [`ConfirmSignal`]s.

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::Result;

/// A broker channel that can publish envelopes.
pub trait Channel: Send + Sync {
    /// Publish an encoded payload under a routing key.
    fn publish(
        &self,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// A channel in publisher-confirm mode.
pub trait ConfirmChannel: Channel {
    /// Sequence number the next successful publish on this channel will get.
    ///
    /// Numbers start at 1, strictly increase and are never reused.
    fn next_publish_seq_no(&self) -> u64;
}

/// Broker verdict on a confirm-tracked publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Ack,
    Nack,
}

/// An asynchronous acknowledgement from the broker.
///
/// With `multiple` set, the signal covers every outstanding sequence up to
/// and including `tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmSignal {
    pub tag: u64,
    pub multiple: bool,
    pub confirmation: Confirmation,
}

impl ConfirmSignal {
    pub fn ack(tag: u64, multiple: bool) -> Self {
        Self {
            tag,
            multiple,
            confirmation: Confirmation::Ack,
        }
    }

    pub fn nack(tag: u64, multiple: bool) -> Self {
        Self {
            tag,
            multiple,
            confirmation: Confirmation::Nack,
        }
    }
}

pub type ConfirmSender = mpsc::UnboundedSender<ConfirmSignal>;
pub type ConfirmReceiver = mpsc::UnboundedReceiver<ConfirmSignal>;

/// Create the stream confirmations are delivered on.
pub fn confirm_stream() -> (ConfirmSender, ConfirmReceiver) {
    mpsc::unbounded_channel()
}
