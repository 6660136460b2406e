//! Agent runner for lifecycle management.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use devwatch_common::{Kind, Result};
use devwatch_publisher::{
    Channel, ConfirmChannel, ConfirmReceiver, PublishError, PublisherStatsSnapshot,
    ReliablePublisher,
};

use crate::config::{AgentConfig, ConfirmConfig};
use crate::source::{CpuSource, RamSource, ServiceEventSource, ValueSource};

/// Runner that manages the lifecycle of an agent.
///
/// Handles:
/// - The confirmation loop task
/// - One task per source per device
/// - Graceful shutdown on Ctrl+C
/// - Closing the publisher before the transport goes away
pub struct AgentRunner<C, D> {
    config: AgentConfig,
    publisher: Arc<ReliablePublisher<C, D>>,
    shutdown: watch::Sender<bool>,
    confirmations: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl<C, D> AgentRunner<C, D>
where
    C: ConfirmChannel + 'static,
    D: Channel + 'static,
{
    /// Create a runner and start applying broker confirmations.
    pub fn new(
        config: AgentConfig,
        publisher: ReliablePublisher<C, D>,
        confirmations: ConfirmReceiver,
    ) -> Self {
        let publisher = Arc::new(publisher);
        let (shutdown, _) = watch::channel(false);

        let confirmations = tokio::spawn({
            let publisher = publisher.clone();
            async move { publisher.run_confirmations(confirmations).await }
        });

        Self {
            config,
            publisher,
            shutdown,
            confirmations,
            tasks: Vec::new(),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Get the shared publisher.
    pub fn publisher(&self) -> Arc<ReliablePublisher<C, D>> {
        self.publisher.clone()
    }

    /// Spawn a task driving one source for one device.
    pub fn spawn_source(&mut self, device: String, source: Box<dyn ValueSource>) {
        let publisher = self.publisher.clone();
        let confirm = self.config.agent.confirm;
        let shutdown = self.shutdown.subscribe();

        self.tasks.push(tokio::spawn(run_source(
            device, source, publisher, confirm, shutdown,
        )));
    }

    /// Spawn every enabled source for every configured device.
    pub fn spawn_sources(&mut self) {
        let sources = self.config.agent.sources.clone();

        for device in self.config.device_identifiers() {
            if sources.cpu.enabled {
                self.spawn_source(device.clone(), Box::new(CpuSource::new(sources.cpu.clone())));
            }
            if sources.ram.enabled {
                self.spawn_source(device.clone(), Box::new(RamSource::new(sources.ram.clone())));
            }
            if sources.services.enabled {
                self.spawn_source(
                    device.clone(),
                    Box::new(ServiceEventSource::new(sources.services.clone())),
                );
            }
            info!(device = %device, "Device sources started");
        }
    }

    /// Run the agent until Ctrl+C is received.
    pub async fn run(mut self) -> Result<PublisherStatsSnapshot> {
        self.spawn_sources();

        info!(tasks = self.tasks.len(), "Agent running, press Ctrl+C to stop");
        signal::ctrl_c().await?;
        info!("Shutdown signal received");

        Ok(self.shutdown().await)
    }

    /// Stop sources, then close the publisher.
    ///
    /// Sources finish their in-flight publish before exiting. Whatever is
    /// still unconfirmed afterwards is abandoned.
    pub async fn shutdown(self) -> PublisherStatsSnapshot {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Source task failed");
            }
        }

        let abandoned = self.publisher.close().await;
        self.confirmations.abort();

        let stats = self.publisher.stats().snapshot();
        info!(
            published = stats.published,
            confirmed = stats.confirmed,
            acked = stats.acked,
            nacked = stats.nacked,
            resent = stats.resent,
            resend_failed = stats.resend_failed,
            abandoned,
            "Agent stopped"
        );
        stats
    }
}

/// Whether values of a kind are published confirm-tracked.
pub fn confirm_for(kind: Kind, confirm: ConfirmConfig) -> bool {
    match kind {
        Kind::ServiceEvent => confirm.events,
        Kind::Cpu | Kind::Ram | Kind::Unknown => confirm.metrics,
    }
}

/// Drive a source until shutdown.
pub async fn run_source<C, D>(
    device: String,
    mut source: Box<dyn ValueSource>,
    publisher: Arc<ReliablePublisher<C, D>>,
    confirm: ConfirmConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    C: ConfirmChannel,
    D: Channel,
{
    debug!(device = %device, source = source.name(), "Starting source");

    loop {
        if let Some(value) = source.next_value() {
            let tracked = confirm_for(value.kind(), confirm);
            match publisher.publish(&device, &value, tracked).await {
                Ok(sequence) => {
                    debug!(device = %device, value = %value, sequence = ?sequence, "Published");
                }
                Err(PublishError::Encoding(e)) => {
                    warn!(device = %device, value = %value, error = %e, "Dropping unencodable value");
                }
                Err(e) => {
                    warn!(device = %device, value = %value, error = %e, "Publish failed");
                }
            }
        }

        let delay = source.next_delay();
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!(device = %device, source = source.name(), "Source stopped");
}
