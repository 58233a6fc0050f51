//! Guest configuration.
//!
//! Grounded on `include/arion/common/config.hpp`'s `CONFIG` struct, extended
//! with a builder (`hypervisor/core.rs`'s `VmSpecBuilder`, `cli/mod.rs`'s
//! `CliConfig`).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    Off,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            "OFF" => Ok(LogLevel::Off),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl LogLevel {
    pub fn to_log_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// The two configuration options this crate recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_lvl: LogLevel,
    pub enable_sleep_syscalls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_lvl: LogLevel::Info,
            enable_sleep_syscalls: false,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Applies `ARION_LOG_LVL`/`ARION_ENABLE_SLEEP_SYSCALLS` overrides on top
    /// of `self`, mirroring the way a CLI layer falls back to a config file
    /// when no explicit value is given.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(lvl) = std::env::var("ARION_LOG_LVL") {
            if let Ok(parsed) = lvl.parse() {
                self.log_lvl = parsed;
            }
        }
        if let Ok(flag) = std::env::var("ARION_ENABLE_SLEEP_SYSCALLS") {
            self.enable_sleep_syscalls = matches!(flag.as_str(), "1" | "true" | "TRUE" | "yes");
        }
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigBuilder {
    log_lvl: Option<LogLevel>,
    enable_sleep_syscalls: Option<bool>,
}

impl ConfigBuilder {
    pub fn log_lvl(mut self, lvl: LogLevel) -> Self {
        self.log_lvl = Some(lvl);
        self
    }

    pub fn enable_sleep_syscalls(mut self, enable: bool) -> Self {
        self.enable_sleep_syscalls = Some(enable);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            log_lvl: self.log_lvl.unwrap_or(defaults.log_lvl),
            enable_sleep_syscalls: self.enable_sleep_syscalls.unwrap_or(defaults.enable_sleep_syscalls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original() {
        let cfg = Config::default();
        assert_eq!(cfg.log_lvl, LogLevel::Info);
        assert!(!cfg.enable_sleep_syscalls);
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = Config::builder().log_lvl(LogLevel::Off).enable_sleep_syscalls(true).build();
        assert_eq!(cfg.log_lvl, LogLevel::Off);
        assert!(cfg.enable_sleep_syscalls);
    }

    #[test]
    fn parses_all_level_names() {
        for (s, lvl) in [
            ("TRACE", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("Info", LogLevel::Info),
            ("WARN", LogLevel::Warn),
            ("error", LogLevel::Error),
            ("CRITICAL", LogLevel::Critical),
            ("off", LogLevel::Off),
        ] {
            assert_eq!(s.parse::<LogLevel>().unwrap(), lvl);
        }
    }
}
