//! DevWatch Publisher
//!
//! Confirm-tracked telemetry publishing over a topic broker.
//!
//! # Overview
//!
//! This crate provides:
//! - [`ReliablePublisher`] which tracks confirm-mode publishes until the broker
//!   acknowledges them, and resends on negative acknowledgement
//! - [`Channel`] and [`ConfirmChannel`] transport seams
//! - [`AmqpChannel`] for RabbitMQ-style brokers
//! - [`MemoryChannel`] for tests and dry runs
//!
//! # Example
//!
//! ```ignore
//! use devwatch_publisher::{AmqpChannel, ReliablePublisher, confirm_stream};
//!
//! let (tx, rx) = confirm_stream();
//! let confirm = AmqpChannel::confirming(&connection, "telemetry", tx).await?;
//! let best_effort = AmqpChannel::best_effort(&connection, "telemetry").await?;
//! let publisher = Arc::new(ReliablePublisher::new(confirm, best_effort));
//!
//! let confirmations = tokio::spawn({
//!     let publisher = publisher.clone();
//!     async move { publisher.run_confirmations(rx).await }
//! });
//!
//! publisher.publish("device-3", &value, true).await?;
//! ```

mod amqp;
mod channel;
mod error;
mod memory;
mod pending;
mod publisher;

pub use amqp::AmqpChannel;
pub use channel::{
    Channel, ConfirmChannel, ConfirmReceiver, ConfirmSender, ConfirmSignal, Confirmation,
    confirm_stream,
};
pub use error::{PublishError, Result};
pub use memory::{MemoryChannel, PublishedMessage};
pub use publisher::{
    DEFAULT_MAX_PAYLOAD_BYTES, PublisherStats, PublisherStatsSnapshot, ReliablePublisher,
};
