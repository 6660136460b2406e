//! Mock value sources.
//!
//! Each source produces values for one device on its own schedule. The
//! runner drives one task per source per device.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use devwatch_common::{Cpu, Ram, ServiceEvent, SystemValue};

use crate::config::{Bounds, CpuSourceConfig, RamSourceConfig, ServiceSourceConfig};

/// A producer of telemetry values.
pub trait ValueSource: Send {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Produce the next value, if any is due this round.
    fn next_value(&mut self) -> Option<SystemValue>;

    /// How long to wait before the next round.
    fn next_delay(&mut self) -> Duration;
}

fn random_in(rng: &mut SmallRng, bounds: Bounds) -> i32 {
    rng.random_range(bounds.min..bounds.max)
}

/// Random CPU load, power draw and per-core temperatures.
#[derive(Debug)]
pub struct CpuSource {
    rng: SmallRng,
    config: CpuSourceConfig,
}

impl CpuSource {
    pub fn new(config: CpuSourceConfig) -> Self {
        Self::with_rng(config, SmallRng::from_os_rng())
    }

    pub fn with_rng(config: CpuSourceConfig, rng: SmallRng) -> Self {
        Self { rng, config }
    }
}

impl ValueSource for CpuSource {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn next_value(&mut self) -> Option<SystemValue> {
        let load_percentage = self.rng.random_range(0..100);
        let power_draw = random_in(&mut self.rng, self.config.power);

        // Cores run within a couple of degrees of each other.
        let base = random_in(&mut self.rng, self.config.temperature);
        let mut core_temps = Vec::with_capacity(self.config.core_count);
        core_temps.push(base);
        for _ in 1..self.config.core_count {
            core_temps.push(
                self.rng
                    .random_range(base.saturating_sub(2)..base.saturating_add(2)),
            );
        }

        Some(SystemValue::Cpu(Cpu {
            load_percentage,
            power_draw,
            core_temps,
        }))
    }

    fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }
}

/// Random memory usage up to the configured size.
#[derive(Debug)]
pub struct RamSource {
    rng: SmallRng,
    config: RamSourceConfig,
}

impl RamSource {
    pub fn new(config: RamSourceConfig) -> Self {
        Self::with_rng(config, SmallRng::from_os_rng())
    }

    pub fn with_rng(config: RamSourceConfig, rng: SmallRng) -> Self {
        Self { rng, config }
    }
}

impl ValueSource for RamSource {
    fn name(&self) -> &'static str {
        "ram"
    }

    fn next_value(&mut self) -> Option<SystemValue> {
        Some(SystemValue::Ram(Ram {
            used_mb: self.rng.random_range(0..self.config.max_mb),
            total_mb: self.config.max_mb,
            memory_clock: random_in(&mut self.rng, self.config.clock),
        }))
    }

    fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }
}

/// Moves services between the running and stopped sets.
///
/// Each round stops a running service with probability 1/3, starts a
/// stopped one with probability 1/3, and otherwise does nothing. All
/// services start out stopped.
#[derive(Debug)]
pub struct ServiceEventSource {
    rng: SmallRng,
    sleep_lower_ms: u64,
    sleep_upper_ms: u64,
    running: Vec<String>,
    stopped: Vec<String>,
}

impl ServiceEventSource {
    pub fn new(config: ServiceSourceConfig) -> Self {
        Self::with_rng(config, SmallRng::from_os_rng())
    }

    pub fn with_rng(config: ServiceSourceConfig, rng: SmallRng) -> Self {
        Self {
            rng,
            sleep_lower_ms: config.sleep_lower_ms,
            sleep_upper_ms: config.sleep_upper_ms,
            running: Vec::new(),
            stopped: config.names,
        }
    }

    /// Services currently running.
    pub fn running(&self) -> &[String] {
        &self.running
    }

    /// Services currently stopped.
    pub fn stopped(&self) -> &[String] {
        &self.stopped
    }

    fn take_random(rng: &mut SmallRng, from: &mut Vec<String>) -> Option<String> {
        if from.is_empty() {
            return None;
        }
        let index = rng.random_range(0..from.len());
        Some(from.swap_remove(index))
    }
}

impl ValueSource for ServiceEventSource {
    fn name(&self) -> &'static str {
        "services"
    }

    fn next_value(&mut self) -> Option<SystemValue> {
        let roll: f64 = self.rng.random();

        if roll < 1.0 / 3.0 {
            let service = Self::take_random(&mut self.rng, &mut self.running)?;
            self.stopped.push(service.clone());
            Some(ServiceEvent::stopped(service).into())
        } else if roll < 2.0 / 3.0 {
            let service = Self::take_random(&mut self.rng, &mut self.stopped)?;
            self.running.push(service.clone());
            Some(ServiceEvent::started(service).into())
        } else {
            None
        }
    }

    fn next_delay(&mut self) -> Duration {
        Duration::from_millis(
            self.rng
                .random_range(self.sleep_lower_ms..self.sleep_upper_ms),
        )
    }
}
