//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "ess", version, about = "ESS battery guard for Victron GX systems")]
pub struct Cli {
    /// Optional config TOML; environment variables override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Optional .env file (defaults to $ESS_ACCU_OFF_ENV_FILE, then ./.env)
    #[arg(long = "env-file", value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level or filter (error|warn|info|debug|trace); overrides RUST_LOG
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop until SIGINT/SIGTERM
    Run {
        /// Decide and log, but never write to the device
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
        /// Use the built-in plant simulator instead of Modbus
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Stop after this many cycles
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
    },
    /// Load and validate the configuration, then print it
    Check,
    /// One read pass: print measurements and the control registers
    Probe {
        /// Use the built-in plant simulator instead of Modbus
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
}
