//! DevWatch device agent.
//!
//! Publishes mock device telemetry to the broker until Ctrl+C.

use anyhow::Result;
use clap::Parser;

use devwatch_agent::{AgentConfig, AgentRunner};
use devwatch_common::{CommonArgs, DevwatchConfig, broker, init_tracing};
use devwatch_publisher::{AmqpChannel, MemoryChannel, ReliablePublisher, confirm_stream};

#[derive(Parser, Debug)]
#[command(about = "DevWatch device agent")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Publish to an in-memory channel instead of the broker.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AgentConfig::load(&cli.common.config)?;
    cli.common.apply(config.logging_mut());
    init_tracing(config.logging())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        devices = ?config.device_identifiers(),
        exchange = %config.broker.exchange,
        dry_run = cli.dry_run,
        "Starting agent"
    );

    let max_payload_bytes = config.agent.max_payload_bytes;
    let (tx, rx) = confirm_stream();

    if cli.dry_run {
        let publisher = ReliablePublisher::new(
            MemoryChannel::new().without_recording().with_auto_ack(tx),
            MemoryChannel::new().without_recording(),
        )
        .with_max_payload_bytes(max_payload_bytes);

        AgentRunner::new(config, publisher, rx).run().await?;
        return Ok(());
    }

    let connection = broker::connect(&config.broker).await?;
    let confirm = AmqpChannel::confirming(&connection, &config.broker.exchange, tx).await?;
    let best_effort = AmqpChannel::best_effort(&connection, &config.broker.exchange).await?;
    let publisher =
        ReliablePublisher::new(confirm, best_effort).with_max_payload_bytes(max_payload_bytes);

    AgentRunner::new(config, publisher, rx).run().await?;

    connection.close(200, "Agent shutting down").await?;
    tracing::info!("Broker connection closed");

    Ok(())
}
