//! Configuration for the watchdog.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use devwatch_common::{BrokerConfig, DevwatchConfig, Error, LoggingConfig, Result};

/// Complete watchdog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Broker connection settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Consumer and threshold settings.
    #[serde(default)]
    pub watchdog: WatchdogSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Consumer and threshold settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogSettings {
    /// Binding patterns, e.g. `device-3.#` or `*.#` (default: all devices).
    #[serde(default = "default_bindings")]
    pub bindings: Vec<String>,

    /// Unacknowledged deliveries allowed in flight (default: 1).
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,

    /// Consumer tag reported to the broker.
    #[serde(default = "default_consumer_tag")]
    pub consumer_tag: String,

    /// Limits values are checked against.
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_bindings() -> Vec<String> {
    vec![devwatch_common::all_devices_binding()]
}

fn default_prefetch() -> u16 {
    1
}

fn default_consumer_tag() -> String {
    "watchdog".to_string()
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            bindings: default_bindings(),
            prefetch: default_prefetch(),
            consumer_tag: default_consumer_tag(),
            thresholds: Thresholds::default(),
        }
    }
}

/// Limits for threshold evaluation. Values strictly above a limit violate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub cpu: CpuThresholds,

    #[serde(default)]
    pub ram: RamThresholds,

    /// Executables whose stop is a violation.
    #[serde(default)]
    pub critical_processes: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuThresholds {
    /// Mean core temperature in °C (default: 80).
    #[serde(default = "default_max_temp")]
    pub max_temp: f64,

    /// Load in percent (default: 90).
    #[serde(default = "default_max_load")]
    pub max_load: i32,

    /// Power draw in W (default: 150).
    #[serde(default = "default_max_power")]
    pub max_power: i32,
}

fn default_max_temp() -> f64 {
    80.0
}

fn default_max_load() -> i32 {
    90
}

fn default_max_power() -> i32 {
    150
}

impl Default for CpuThresholds {
    fn default() -> Self {
        Self {
            max_temp: default_max_temp(),
            max_load: default_max_load(),
            max_power: default_max_power(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamThresholds {
    /// Used memory in percent of total (default: 90).
    #[serde(default = "default_max_load_u64")]
    pub max_load: u64,

    /// Memory clock in MHz (default: 3600).
    #[serde(default = "default_max_clock")]
    pub max_clock: i32,
}

fn default_max_load_u64() -> u64 {
    90
}

fn default_max_clock() -> i32 {
    3600
}

impl Default for RamThresholds {
    fn default() -> Self {
        Self {
            max_load: default_max_load_u64(),
            max_clock: default_max_clock(),
        }
    }
}

impl DevwatchConfig for WatchdogConfig {
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

        let watchdog = &self.watchdog;
        if watchdog.bindings.is_empty() {
            return Err(Error::validation("watchdog.bindings must not be empty"));
        }
        for binding in &watchdog.bindings {
            if binding.is_empty() || binding.split('.').any(str::is_empty) {
                return Err(Error::validation(format!(
                    "Invalid binding pattern '{}'",
                    binding
                )));
            }
        }
        if watchdog.prefetch == 0 {
            return Err(Error::validation("watchdog.prefetch must be > 0"));
        }

        Ok(())
    }
}
