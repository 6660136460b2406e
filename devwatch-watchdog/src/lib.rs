//! DevWatch watchdog.
//!
//! Consumes device telemetry from the topic exchange, decodes it according
//! to the routing key and checks every value against configured thresholds.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌───────────────────┐     ┌──────────┐     ┌──────────┐
//! │ Topic exchange  │────>│ TelemetryConsumer │────>│ Watchdog │────>│ Notifier │
//! │ (<device>.#)    │     │ RoutingDispatcher │     │ evaluate │     │          │
//! └─────────────────┘     └───────────────────┘     └──────────┘     └──────────┘
//! ```
//!
//! Each delivery is settled individually once dispatch is done. See
//! [`dispatcher`] for the acknowledgement policy.
//!
//! # Usage
//!
//! ```bash
//! devwatch-watchdog --config watchdog.json5
//! ```

pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod evaluator;
pub mod notifier;
pub mod watchdog;

pub use config::{Thresholds, WatchdogConfig};
pub use consumer::TelemetryConsumer;
pub use dispatcher::{AckAction, Outcome, RoutingDispatcher, ValueHandler};
pub use evaluator::evaluate;
pub use notifier::{LogNotifier, Notifier, NotifyError, RecordingNotifier};
pub use watchdog::Watchdog;
