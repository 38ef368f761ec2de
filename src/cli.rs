//! CLI argument parsing for buildmon

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for the session summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "buildmon")]
#[command(version)]
#[command(about = "Parallel build monitor: critical path and build-timing reports", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a build event log and export the critical path report as CSV
    Report {
        /// JSON-lines build event log
        #[arg(long, value_name = "FILE")]
        events: PathBuf,

        /// Build output log containing task performance summaries
        #[arg(long = "output-log", value_name = "FILE")]
        output_log: Option<PathBuf>,

        /// Where to write the CSV report
        #[arg(long, value_name = "FILE")]
        out: PathBuf,

        /// TOML configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Leave the machine description out of the report title
        #[arg(long = "no-machine-info")]
        no_machine_info: bool,
    },

    /// Replay a build event log and print a session summary
    Summary {
        /// JSON-lines build event log
        #[arg(long, value_name = "FILE")]
        events: PathBuf,

        /// Output format (text or json)
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
