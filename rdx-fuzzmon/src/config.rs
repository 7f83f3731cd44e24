//! Defines all configuration structures for the engine and the terminal monitor.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`. Every field has a default, so an empty
//! file or no file at all yields a working setup.

use crate::events::LogLevel;
use serde::Deserialize;
use std::time::Duration;

/// Settings the engine exposes read-only to its observers.
#[derive(Debug, Clone, Deserialize)]
pub struct FuzzerConfig {
    /// Tick speed of the engine's scheduling clock.
    #[serde(default)]
    pub resolution: TimerResolution,

    /// Whether executed samples are instrumented to collect runtime type
    /// information. Enables the type-collection sections of the report.
    #[serde(default)]
    pub collect_runtime_types: bool,
}

/// Defines how often the engine's scheduler checks its recurring tasks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerResolution {
    /// 10 checks per second.
    High,
    /// 1 check per second. Plenty for minute-scale reports.
    #[default]
    Low,
    /// A user-defined rate in ticks per second.
    Custom { ticks_per_second: u64 },
}

impl TimerResolution {
    /// The period between two scheduler ticks.
    pub fn period(&self) -> Duration {
        match self {
            TimerResolution::High => Duration::from_millis(100),
            TimerResolution::Low => Duration::from_secs(1),
            TimerResolution::Custom { ticks_per_second } => {
                Duration::from_secs_f64(1.0 / (*ticks_per_second).max(1) as f64)
            }
        }
    }
}

/// Settings for the terminal monitor itself.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between two periodic statistics reports.
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Log events below this level are not printed. Defaults to printing everything.
    #[serde(default = "default_min_log_level")]
    pub min_log_level: LogLevel,

    /// Whether output is colorized.
    #[serde(default)]
    pub color: ColorMode,
}

impl MonitorConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }
}

/// When ANSI colors are emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Colorize when stdout is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// Applies this mode to the process-wide `colored` switch.
    pub fn apply(self) {
        match self {
            ColorMode::Auto => colored::control::unset_override(),
            ColorMode::Always => colored::control::set_override(true),
            ColorMode::Never => colored::control::set_override(false),
        }
    }
}

// --- Default value functions for serde ---

fn default_report_interval_secs() -> u64 {
    60
}

fn default_min_log_level() -> LogLevel {
    LogLevel::Verbose
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            resolution: TimerResolution::default(),
            collect_runtime_types: false,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
            min_log_level: default_min_log_level(),
            color: ColorMode::default(),
        }
    }
}
