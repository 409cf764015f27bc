//! Configuration loading and management
//!
//! Handles parsing of `.taskstate.toml` configuration files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::oplog::DEFAULT_HISTORY_CAPACITY;

pub const CONFIG_FILE_NAME: &str = ".taskstate.toml";

/// Longest accepted `highlight.window`.
pub const MAX_HIGHLIGHT_WINDOW: Duration = Duration::from_secs(3600);

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Undo history configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Adaptation highlight configuration
    #[serde(default)]
    pub highlight: HighlightConfig,

    /// Event emission configuration
    #[serde(default)]
    pub events: EventsConfig,
}

/// Undo history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of commands kept; oldest are dropped first
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

/// Highlight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// How long adapted tasks stay highlighted (e.g. "5s", "1500ms")
    #[serde(default = "default_highlight_window")]
    pub window: String,
}

fn default_highlight_window() -> String {
    "5s".to_string()
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            window: default_highlight_window(),
        }
    }
}

impl HighlightConfig {
    pub fn window_duration(&self) -> Result<Duration> {
        parse_duration(&self.window)
    }
}

/// Event emission configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// "-" for stdout, or a file path; unset disables events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.taskstate.toml` from a directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.history.capacity == 0 {
            return Err(Error::InvalidConfig(
                "history.capacity must be >= 1".to_string(),
            ));
        }

        let window = self.highlight.window_duration().map_err(|err| {
            Error::InvalidConfig(format!("highlight.window: {err}"))
        })?;
        if window.is_zero() {
            return Err(Error::InvalidConfig(
                "highlight.window must be > 0".to_string(),
            ));
        }
        if window > MAX_HIGHLIGHT_WINDOW {
            return Err(Error::InvalidConfig(format!(
                "highlight.window must be <= {}s",
                MAX_HIGHLIGHT_WINDOW.as_secs()
            )));
        }

        if let Some(destination) = &self.events.destination {
            if destination.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "events.destination cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Parse a duration such as "5s", "1500ms", "2m" or "1h".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], s[pos..].trim()),
        None => (s, "s"),
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: {num_str}")))?;

    let duration = match unit.to_lowercase().as_str() {
        "ms" | "millis" | "milliseconds" => Duration::from_millis(num),
        "s" | "sec" | "second" | "seconds" => Duration::from_secs(num),
        "m" | "min" | "minute" | "minutes" => Duration::from_secs(scaled(num, 60)?),
        "h" | "hr" | "hour" | "hours" => Duration::from_secs(scaled(num, 3600)?),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{unit}'. Expected: ms, s, m, h"
            )));
        }
    };

    Ok(duration)
}

fn scaled(num: u64, factor: u64) -> Result<u64> {
    num.checked_mul(factor)
        .ok_or_else(|| Error::InvalidArgument("duration too large".to_string()))
}
