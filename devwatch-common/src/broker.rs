//! Broker connection bootstrap.

use lapin::options::ExchangeDeclareOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::config::BrokerConfig;
use crate::error::Result;

/// Open a connection to the broker described by the configuration.
pub async fn connect(config: &BrokerConfig) -> Result<Connection> {
    tracing::info!(uri = %redact(&config.uri), "Connecting to broker");

    let connection = Connection::connect(&config.uri, ConnectionProperties::default()).await?;

    tracing::info!("Broker connection established");
    Ok(connection)
}

/// Declare the durable topic exchange telemetry is routed through.
pub async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<()> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    tracing::debug!(exchange = %exchange, "Declared topic exchange");
    Ok(())
}

/// Strip credentials from a broker URI before logging it.
pub fn redact(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &uri[..scheme_end], &uri[at + 1..])
        }
        _ => uri.to_string(),
    }
}
