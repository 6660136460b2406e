//! Violation notification.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

/// Errors delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Receives the violations found for one evaluated value.
///
/// Called at most once per value, and only with a non-empty list.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        device: &str,
        violations: &[String],
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Notifier that reports violations as warnings in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, device: &str, violations: &[String]) -> Result<(), NotifyError> {
        warn!(device = %device, count = violations.len(), "Threshold violations");
        for violation in violations {
            warn!(device = %device, "{} --> {}", device, violation);
        }
        Ok(())
    }
}

/// Notifier that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<(String, Vec<String>)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent notifications fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Notifications received so far, as `(device, violations)`.
    pub fn notifications(&self) -> Vec<(String, Vec<String>)> {
        self.notifications.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, device: &str, violations: &[String]) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("recording notifier is failing".to_string()));
        }
        self.notifications
            .lock()
            .push((device.to_string(), violations.to_vec()));
        Ok(())
    }
}
