//! Monitor configuration (`buildmon.toml`)
//!
//! # Example buildmon.toml
//!
//! ```toml
//! sample_interval_ms = 500
//! csv_separator = ";"
//! strict_densify = false
//! ```
//!
//! Every key is optional; missing keys take their default.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Settings for sampling and report export
///
/// # Example
/// ```
/// use buildmon::config::MonitorConfig;
///
/// let config = MonitorConfig::default();
/// assert_eq!(config.sample_interval_ms, 1000);
/// assert_eq!(config.csv_separator, ",");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Period of the CPU/disk usage sampler
    ///
    /// Default: 1000 ms
    pub sample_interval_ms: u64,

    /// Cell separator of the exported report
    ///
    /// Must be non-empty and must not contain `"`, which is reserved for
    /// quoting. Default: `,`
    pub csv_separator: String,

    /// Appended to each task column header of the detailed report
    ///
    /// Default: ` [ms]`
    pub duration_unit_suffix: String,

    /// Mark the report incomplete when a task value had no column
    ///
    /// Default: true
    pub strict_densify: bool,

    /// Text in front of the session title in the report's first row
    pub title_prefix: String,

    /// Separator between session name, start time and machine description
    pub field_separator: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            csv_separator: ",".to_string(),
            duration_unit_suffix: " [ms]".to_string(),
            strict_densify: true,
            title_prefix: "CRITICAL PATH for ".to_string(),
            field_separator: "  |  ".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "sample_interval_ms must be > 0".to_string(),
            ));
        }

        if self.csv_separator.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "csv_separator must not be empty".to_string(),
            ));
        }

        if self.csv_separator.contains('"') {
            return Err(MonitorError::InvalidConfig(format!(
                "csv_separator must not contain a quote, got {:?}",
                self.csv_separator
            )));
        }

        Ok(())
    }

    /// Sampler period as a `Duration`
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
