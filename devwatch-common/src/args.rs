//! CLI argument parsing shared by the DevWatch binaries.

use std::path::PathBuf;

use clap::Args;

/// Common CLI arguments, flattened into each binary's own parser.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl CommonArgs {
    /// Apply the CLI overrides to a loaded logging configuration.
    pub fn apply(&self, logging: &mut crate::LoggingConfig) {
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
    }
}
