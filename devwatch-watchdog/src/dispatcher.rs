//! Routing key classification and decode dispatch.
//!
//! Every delivery ends in exactly one [`AckAction`]:
//!
//! | Situation                         | Outcome     | Action  |
//! |-----------------------------------|-------------|---------|
//! | decoded and handled               | `Handled`   | Ack     |
//! | routing key of no known kind      | `Ignored`   | Ack     |
//! | recognised kind, bytes undecodable| `Poison`    | Reject  |
//! | handler failure                   | `Transient` | Requeue |

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use devwatch_common::routing::find_rule;
use devwatch_common::{Classified, EnvelopeError, SystemValue, classify};

/// Consumer of decoded values.
pub trait ValueHandler: Send + Sync {
    type Error: Display;

    fn handle(
        &self,
        device: &str,
        value: &SystemValue,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<H: ValueHandler> ValueHandler for Arc<H> {
    type Error = H::Error;

    fn handle(
        &self,
        device: &str,
        value: &SystemValue,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        (**self).handle(device, value)
    }
}

/// Result of dispatching one message.
#[derive(Debug)]
pub enum Outcome {
    /// Decoded and handled.
    Handled,
    /// Not a kind this consumer understands.
    Ignored,
    /// Will never decode, however often it is redelivered.
    Poison(EnvelopeError),
    /// Failed for a reason that may clear up on redelivery.
    Transient(String),
}

impl Outcome {
    /// Acknowledgement the message gets.
    pub fn action(&self) -> AckAction {
        match self {
            Outcome::Handled | Outcome::Ignored => AckAction::Ack,
            Outcome::Poison(_) => AckAction::Reject,
            Outcome::Transient(_) => AckAction::Requeue,
        }
    }
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    /// Acknowledge.
    Ack,
    /// Reject without requeue.
    Reject,
    /// Negative-acknowledge with requeue.
    Requeue,
}

/// Classifies routing keys, decodes payloads and hands values on.
#[derive(Debug, Default)]
pub struct RoutingDispatcher {
    stats: Arc<DispatchStats>,
}

impl RoutingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a routing key into device identifier and kind.
    pub fn classify<'a>(&self, routing_key: &'a str) -> Classified<'a> {
        classify(routing_key)
    }

    /// Dispatch one message.
    pub async fn dispatch<H: ValueHandler>(
        &self,
        routing_key: &str,
        data: &[u8],
        handler: &H,
    ) -> Outcome {
        let (device, rule) = find_rule(routing_key);

        let Some(rule) = rule else {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            debug!(routing_key = %routing_key, "Ignoring unknown routing key");
            return Outcome::Ignored;
        };

        let value = match rule.decode(data) {
            Ok(value) => value,
            Err(e) => {
                self.stats.poisoned.fetch_add(1, Ordering::Relaxed);
                warn!(
                    routing_key = %routing_key,
                    kind = %rule.kind(),
                    payload_len = data.len(),
                    error = %e,
                    "Dropping undecodable payload"
                );
                return Outcome::Poison(e);
            }
        };

        trace!(device = %device, value = %value, "Decoded");

        match handler.handle(device, &value).await {
            Ok(()) => {
                self.stats.handled.fetch_add(1, Ordering::Relaxed);
                Outcome::Handled
            }
            Err(e) => {
                self.stats.transient.fetch_add(1, Ordering::Relaxed);
                warn!(device = %device, routing_key = %routing_key, error = %e, "Handler failed, requeueing");
                Outcome::Transient(e.to_string())
            }
        }
    }

    /// Get the dispatch statistics.
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }
}

/// Dispatch statistics.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Messages decoded and handled.
    pub handled: AtomicU64,
    /// Messages with an unknown routing key.
    pub ignored: AtomicU64,
    /// Messages rejected as poison.
    pub poisoned: AtomicU64,
    /// Messages requeued after a handler failure.
    pub transient: AtomicU64,
}

impl DispatchStats {
    /// Get current statistics.
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            handled: self.handled.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            poisoned: self.poisoned.load(Ordering::Relaxed),
            transient: self.transient.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub handled: u64,
    pub ignored: u64,
    pub poisoned: u64,
    pub transient: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use devwatch_common::envelope::encode;
    use devwatch_common::{Cpu, Kind, Ram, ServiceEvent};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect {
        values: Mutex<Vec<(String, SystemValue)>>,
    }

    impl ValueHandler for Collect {
        type Error = String;

        async fn handle(&self, device: &str, value: &SystemValue) -> Result<(), String> {
            self.values.lock().push((device.to_string(), value.clone()));
            Ok(())
        }
    }

    struct Fail;

    impl ValueHandler for Fail {
        type Error = String;

        async fn handle(&self, _device: &str, _value: &SystemValue) -> Result<(), String> {
            Err("notifier unavailable".to_string())
        }
    }

    #[test]
    fn test_classify() {
        let dispatcher = RoutingDispatcher::new();
        let classified = dispatcher.classify("device-2.metrics.cpu");
        assert_eq!(classified.device, "device-2");
        assert_eq!(classified.kind, Kind::Cpu);
    }

    #[tokio::test]
    async fn test_well_formed_is_handled() {
        let dispatcher = RoutingDispatcher::new();
        let handler = Collect::default();
        let value = SystemValue::from(Ram {
            used_mb: 100,
            total_mb: 200,
            memory_clock: 3000,
        });

        let outcome = dispatcher
            .dispatch("device-4.metrics.ram", &encode(&value), &handler)
            .await;

        assert!(matches!(outcome, Outcome::Handled));
        assert_eq!(outcome.action(), AckAction::Ack);
        assert_eq!(
            *handler.values.lock(),
            vec![("device-4".to_string(), value)]
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_is_ignored() {
        let dispatcher = RoutingDispatcher::new();
        let handler = Collect::default();

        let outcome = dispatcher
            .dispatch("device-4.metrics.gpu", &[0xff, 0x00], &handler)
            .await;

        assert!(matches!(outcome, Outcome::Ignored));
        assert_eq!(outcome.action(), AckAction::Ack);
        assert!(handler.values.lock().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_poison() {
        let dispatcher = RoutingDispatcher::new();
        let handler = Collect::default();
        let mut bytes = encode(&SystemValue::from(Cpu {
            load_percentage: 1,
            power_draw: 2,
            core_temps: vec![3, 4, 5],
        }));
        bytes.truncate(bytes.len() - 2);

        let outcome = dispatcher
            .dispatch("device-4.metrics.cpu", &bytes, &handler)
            .await;

        assert!(matches!(outcome, Outcome::Poison(EnvelopeError::Malformed { .. })));
        assert_eq!(outcome.action(), AckAction::Reject);
        assert!(handler.values.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_event_type_is_poison() {
        let dispatcher = RoutingDispatcher::new();
        // executable = "sshd", event type 9.
        let bytes = [0x0a, 0x04, b's', b's', b'h', b'd', 0x10, 0x09];

        let outcome = dispatcher
            .dispatch("device-4.events.service.stopped", &bytes, &Collect::default())
            .await;

        assert!(matches!(
            outcome,
            Outcome::Poison(EnvelopeError::InvalidEventType(9))
        ));
    }

    #[tokio::test]
    async fn test_handler_failure_is_transient() {
        let dispatcher = RoutingDispatcher::new();
        let bytes = encode(&SystemValue::from(ServiceEvent::stopped("sshd")));

        let outcome = dispatcher
            .dispatch("device-4.events.service.stopped", &bytes, &Fail)
            .await;

        assert!(matches!(outcome, Outcome::Transient(ref e) if e == "notifier unavailable"));
        assert_eq!(outcome.action(), AckAction::Requeue);
    }

    #[tokio::test]
    async fn test_stats() {
        let dispatcher = RoutingDispatcher::new();
        let handler = Collect::default();
        let good = encode(&SystemValue::from(ServiceEvent::started("cron")));

        dispatcher
            .dispatch("d.events.service.started", &good, &handler)
            .await;
        dispatcher.dispatch("d.unknown", &good, &handler).await;
        dispatcher.dispatch("d.metrics.ram", &[0x08], &handler).await;
        dispatcher
            .dispatch("d.events.service.started", &good, &Fail)
            .await;

        assert_eq!(
            dispatcher.stats().snapshot(),
            DispatchStatsSnapshot {
                handled: 1,
                ignored: 1,
                poisoned: 1,
                transient: 1,
            }
        );
    }
}
