//! Buildmon - parallel build monitor
//!
//! Records when each project of a solution build begins and finishes,
//! resolves the critical path through the build dependency graph and turns
//! per-task build timing output into a CSV report.
//!
//! The host feeds build lifecycle notifications into a
//! [`monitor::BuildMonitor`]; recorded builds can be replayed from a
//! JSON-lines event log with [`replay`].

pub mod build_info;
pub mod cli;
pub mod clock;
pub mod config;
pub mod critical_path;
pub mod csv_output;
pub mod dependency_graph;
pub mod error;
pub mod machine_info;
pub mod monitor;
pub mod replay;
pub mod report;
pub mod serde_duration;
pub mod session;
pub mod timing_parser;
pub mod usage;

pub use error::{MonitorError, Result};
