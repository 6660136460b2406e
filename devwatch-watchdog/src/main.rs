//! DevWatch watchdog.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use devwatch_common::{CommonArgs, DevwatchConfig, broker, init_tracing};
use devwatch_watchdog::consumer::{Stop, wait_for_stop};
use devwatch_watchdog::{LogNotifier, TelemetryConsumer, Watchdog, WatchdogConfig};

#[derive(Parser, Debug)]
#[command(name = "devwatch-watchdog")]
#[command(about = "Check device telemetry against thresholds")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = WatchdogConfig::load(&cli.common.config)?;
    cli.common.apply(config.logging_mut());
    init_tracing(config.logging())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        broker = %broker::redact(&config.broker.uri),
        exchange = %config.broker.exchange,
        bindings = ?config.watchdog.bindings,
        critical = config.watchdog.thresholds.critical_processes.len(),
        "Starting watchdog"
    );

    let connection = broker::connect(&config.broker).await?;

    let watchdog = Arc::new(Watchdog::new(
        config.watchdog.thresholds.clone(),
        LogNotifier,
    ));
    let consumer = TelemetryConsumer::declare(
        &connection,
        &config.broker,
        &config.watchdog,
        watchdog.clone(),
    )
    .await?;
    let dispatch_stats = consumer.stats();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    let signal = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "Ctrl+C",
            _ = terminate() => "SIGTERM",
        }
    };

    let failure = match wait_for_stop(&mut consumer_task, signal).await {
        Stop::Signal(name) => {
            info!("Received {}, shutting down...", name);
            shutdown_tx.send(true)?;

            match tokio::time::timeout(Duration::from_secs(5), &mut consumer_task).await {
                Ok(Ok(Err(e))) => error!("Consumer error: {}", e),
                Ok(Err(e)) => error!("Consumer task failed: {}", e),
                Ok(Ok(Ok(()))) => {}
                Err(_) => warn!("Consumer did not stop within 5s"),
            }
            None
        }
        Stop::Consumer(Ok(Ok(()))) => Some(anyhow!("Consumer stopped unexpectedly")),
        Stop::Consumer(Ok(Err(e))) => Some(anyhow::Error::from(e).context("Consumer failed")),
        Stop::Consumer(Err(e)) => Some(anyhow::Error::from(e).context("Consumer task failed")),
    };

    if let Err(e) = connection.close(200, "Watchdog shutting down").await {
        warn!(error = %e, "Failed to close broker connection");
    }

    let dispatch = dispatch_stats.snapshot();
    let checks = watchdog.stats().snapshot();
    info!(
        handled = dispatch.handled,
        ignored = dispatch.ignored,
        poisoned = dispatch.poisoned,
        requeued = dispatch.transient,
        evaluated = checks.evaluated,
        violations = checks.violations,
        notify_failed = checks.notify_failed,
        "Final statistics"
    );

    if let Some(e) = failure {
        error!("Watchdog stopped: {:#}", e);
        return Err(e);
    }

    info!("Watchdog stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
