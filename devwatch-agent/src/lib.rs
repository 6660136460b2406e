//! DevWatch device agent.
//!
//! Generates CPU, RAM and service telemetry for one or more simulated
//! devices and publishes it to a topic exchange.
//!
//! # Routing Keys
//!
//! ```text
//! <device>.metrics.cpu
//! <device>.metrics.ram
//! <device>.events.service.started
//! <device>.events.service.stopped
//! ```

pub mod config;
pub mod runner;
pub mod source;

pub use config::AgentConfig;
pub use runner::AgentRunner;
