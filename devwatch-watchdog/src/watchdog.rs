//! Threshold monitoring of decoded values.

use std::sync::atomic::{AtomicU64, Ordering};

use devwatch_common::SystemValue;

use crate::config::Thresholds;
use crate::dispatcher::ValueHandler;
use crate::evaluator::evaluate;
use crate::notifier::{Notifier, NotifyError};

/// Evaluates every value and notifies about violations.
#[derive(Debug)]
pub struct Watchdog<N> {
    thresholds: Thresholds,
    notifier: N,
    stats: WatchdogStats,
}

impl<N: Notifier> Watchdog<N> {
    pub fn new(thresholds: Thresholds, notifier: N) -> Self {
        Self {
            thresholds,
            notifier,
            stats: WatchdogStats::default(),
        }
    }

    /// Get the thresholds values are checked against.
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Get the notifier.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Get the watchdog statistics.
    pub fn stats(&self) -> &WatchdogStats {
        &self.stats
    }
}

impl<N: Notifier> ValueHandler for Watchdog<N> {
    type Error = NotifyError;

    async fn handle(&self, device: &str, value: &SystemValue) -> Result<(), NotifyError> {
        let violations = evaluate(device, value, &self.thresholds);
        self.stats.evaluated.fetch_add(1, Ordering::Relaxed);

        if violations.is_empty() {
            return Ok(());
        }

        self.stats
            .violations
            .fetch_add(violations.len() as u64, Ordering::Relaxed);

        self.notifier
            .notify(device, &violations)
            .await
            .inspect_err(|_| {
                self.stats.notify_failed.fetch_add(1, Ordering::Relaxed);
            })
    }
}

/// Watchdog statistics.
#[derive(Debug, Default)]
pub struct WatchdogStats {
    /// Values evaluated.
    pub evaluated: AtomicU64,
    /// Violations found.
    pub violations: AtomicU64,
    /// Notifications that could not be delivered.
    pub notify_failed: AtomicU64,
}

impl WatchdogStats {
    /// Get current statistics.
    pub fn snapshot(&self) -> WatchdogStatsSnapshot {
        WatchdogStatsSnapshot {
            evaluated: self.evaluated.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
            notify_failed: self.notify_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of watchdog statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogStatsSnapshot {
    pub evaluated: u64,
    pub violations: u64,
    pub notify_failed: u64,
}
