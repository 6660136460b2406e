//! Configuration for the device agent.

use serde::{Deserialize, Serialize};

use devwatch_common::{
    BrokerConfig, DevwatchConfig, Error, LoggingConfig, Result, validate_device_identifier,
};

/// Complete agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Broker connection settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Agent settings.
    #[serde(default)]
    pub agent: AgentSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device and source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Device identifier used as routing key prefix.
    /// Use "auto" to derive it from the hostname (default).
    #[serde(default = "default_device_identifier")]
    pub device_identifier: String,

    /// Number of simulated devices. Above 1, devices are named `<id>-<n>`.
    #[serde(default = "default_instances")]
    pub instances: usize,

    /// Which values are published confirm-tracked.
    #[serde(default)]
    pub confirm: ConfirmConfig,

    /// Largest encoded envelope accepted (default: 128 KiB).
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Value sources.
    #[serde(default)]
    pub sources: SourcesConfig,
}

fn default_device_identifier() -> String {
    "auto".to_string()
}

fn default_instances() -> usize {
    1
}

fn default_max_payload_bytes() -> usize {
    devwatch_publisher::DEFAULT_MAX_PAYLOAD_BYTES
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            device_identifier: default_device_identifier(),
            instances: default_instances(),
            confirm: ConfirmConfig::default(),
            max_payload_bytes: default_max_payload_bytes(),
            sources: SourcesConfig::default(),
        }
    }
}

/// Confirm tracking per value category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// Confirm CPU and RAM metrics (default: false).
    #[serde(default)]
    pub metrics: bool,

    /// Confirm service events (default: true).
    #[serde(default = "default_true")]
    pub events: bool,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            metrics: false,
            events: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Inclusive lower, exclusive upper bound for generated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
}

impl Bounds {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.min >= self.max {
            return Err(Error::validation(format!(
                "{}: min ({}) must be below max ({})",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// All value sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub cpu: CpuSourceConfig,

    #[serde(default)]
    pub ram: RamSourceConfig,

    #[serde(default)]
    pub services: ServiceSourceConfig,
}

/// CPU metrics source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between samples in milliseconds (default: 1000).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Number of cores reported (default: 4).
    #[serde(default = "default_core_count")]
    pub core_count: usize,

    /// Core temperature range in °C.
    #[serde(default = "default_temperature")]
    pub temperature: Bounds,

    /// Power draw range in W.
    #[serde(default = "default_power")]
    pub power: Bounds,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_core_count() -> usize {
    4
}

fn default_temperature() -> Bounds {
    Bounds::new(40, 95)
}

fn default_power() -> Bounds {
    Bounds::new(20, 180)
}

impl Default for CpuSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_interval_ms(),
            core_count: default_core_count(),
            temperature: default_temperature(),
            power: default_power(),
        }
    }
}

/// RAM metrics source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RamSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between samples in milliseconds (default: 1000).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Installed memory in MB (default: 16384).
    #[serde(default = "default_max_mb")]
    pub max_mb: u32,

    /// Memory clock range in MHz.
    #[serde(default = "default_clock")]
    pub clock: Bounds,
}

fn default_max_mb() -> u32 {
    16384
}

fn default_clock() -> Bounds {
    Bounds::new(2400, 4000)
}

impl Default for RamSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_interval_ms(),
            max_mb: default_max_mb(),
            clock: default_clock(),
        }
    }
}

/// Service start/stop event source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Shortest sleep between events in milliseconds.
    #[serde(default = "default_sleep_lower_ms")]
    pub sleep_lower_ms: u64,

    /// Longest sleep between events in milliseconds.
    #[serde(default = "default_sleep_upper_ms")]
    pub sleep_upper_ms: u64,

    /// Executables the source moves between running and stopped.
    #[serde(default = "default_service_names")]
    pub names: Vec<String>,
}

fn default_sleep_lower_ms() -> u64 {
    500
}

fn default_sleep_upper_ms() -> u64 {
    3000
}

fn default_service_names() -> Vec<String> {
    ["nginx", "sshd", "postgres", "cron"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ServiceSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sleep_lower_ms: default_sleep_lower_ms(),
            sleep_upper_ms: default_sleep_upper_ms(),
            names: default_service_names(),
        }
    }
}

impl DevwatchConfig for AgentConfig {
    fn broker(&self) -> &BrokerConfig {
        &self.broker
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn logging_mut(&mut self) -> &mut LoggingConfig {
        &mut self.logging
    }

    fn validate(&self) -> Result<()> {
        if self.broker.exchange.is_empty() {
            return Err(Error::validation("broker.exchange must not be empty"));
        }

        let agent = &self.agent;
        if agent.instances == 0 {
            return Err(Error::validation("agent.instances must be > 0"));
        }
        if agent.device_identifier != "auto" {
            validate_device_identifier(&agent.device_identifier)?;
        }

        let sources = &agent.sources;
        if !sources.cpu.enabled && !sources.ram.enabled && !sources.services.enabled {
            return Err(Error::validation("At least one source must be enabled"));
        }

        if sources.cpu.enabled {
            if sources.cpu.interval_ms == 0 {
                return Err(Error::validation("sources.cpu.interval_ms must be > 0"));
            }
            if sources.cpu.core_count == 0 {
                return Err(Error::validation("sources.cpu.core_count must be > 0"));
            }
            sources.cpu.temperature.check("sources.cpu.temperature")?;
            sources.cpu.power.check("sources.cpu.power")?;
        }

        if sources.ram.enabled {
            if sources.ram.interval_ms == 0 {
                return Err(Error::validation("sources.ram.interval_ms must be > 0"));
            }
            if sources.ram.max_mb == 0 {
                return Err(Error::validation("sources.ram.max_mb must be > 0"));
            }
            sources.ram.clock.check("sources.ram.clock")?;
        }

        if sources.services.enabled {
            if sources.services.names.is_empty() {
                return Err(Error::validation("sources.services.names must not be empty"));
            }
            if sources.services.sleep_lower_ms >= sources.services.sleep_upper_ms {
                return Err(Error::validation(
                    "sources.services.sleep_lower_ms must be below sleep_upper_ms",
                ));
            }
        }

        Ok(())
    }
}

impl AgentConfig {
    /// Get the base device identifier, resolving "auto" from the hostname.
    ///
    /// Hostnames are lowercased and dots replaced so the result forms a
    /// single routing key segment.
    pub fn device_identifier(&self) -> String {
        if self.agent.device_identifier == "auto" {
            let hostname = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string());
            sanitize_identifier(&hostname)
        } else {
            self.agent.device_identifier.clone()
        }
    }

    /// Identifiers of every simulated device.
    pub fn device_identifiers(&self) -> Vec<String> {
        let base = self.device_identifier();
        if self.agent.instances == 1 {
            vec![base]
        } else {
            (0..self.agent.instances)
                .map(|i| format!("{}-{}", base, i))
                .collect()
        }
    }
}

/// Turn an arbitrary host name into a valid device identifier.
pub fn sanitize_identifier(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '.' | '*' | '#' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect::<String>()
        .to_lowercase();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}
