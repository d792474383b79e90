//! Runtime parameters and fixed timing constants.
//!
//! `LoggerConfig` is read from `PARAM.txt` at boot: a header line of keys and
//! one line of values, both comma-separated.
//!
//! ```text
//! sample_freq_m,irid_freq_h,onstart_samples,test_mode
//! 15,1,2,0
//! ```
//!
//! Any key left out keeps its default. A file that cannot be parsed is
//! rejected as a whole so the caller can fall back to [`LoggerConfig::default`].

use log::{debug, warn};
use thiserror_no_std::Error;

/// Name of the parameter file in the card root.
pub const PARAM_FILE: &str = "/PARAM.txt";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("parameter file needs a header line and a values line")]
    MissingLine,
    #[error("parameter file has {keys} keys but {values} values")]
    ColumnMismatch { keys: usize, values: usize },
    #[error("value for {key} is not valid")]
    InvalidValue { key: &'static str },
    #[error("{key} is out of range")]
    OutOfRange { key: &'static str },
}

/// Parameters an operator can change without reflashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Minutes between samples (`sample_freq_m`)
    pub sample_interval_minutes: u8,
    /// Hours between transmissions (`irid_freq_h`)
    pub transmit_interval_hours: u8,
    /// Samples taken immediately at boot (`onstart_samples`)
    pub onstart_samples: u8,
    /// Wipe both streams at boot (`test_mode`)
    pub test_mode: bool,
    /// Coarse wake granularity in seconds (`blink_freq_s`)
    pub blink_interval_secs: u8,
    /// Noon clock sync happens on days divisible by this (`sync_every_d`)
    pub clock_sync_every_days: u8,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            sample_interval_minutes: 15,
            transmit_interval_hours: 1,
            onstart_samples: 0,
            test_mode: false,
            blink_interval_secs: 10,
            clock_sync_every_days: 5,
        }
    }
}

impl LoggerConfig {
    /// Parse `PARAM.txt` contents on top of the defaults.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let keys = lines.next().ok_or(ConfigError::MissingLine)?;
        let values = lines.next().ok_or(ConfigError::MissingLine)?;

        let key_count = keys.split(',').count();
        let value_count = values.split(',').count();
        if key_count != value_count {
            return Err(ConfigError::ColumnMismatch {
                keys: key_count,
                values: value_count,
            });
        }

        let mut config = Self::default();
        for (key, value) in keys.split(',').zip(values.split(',')) {
            let value = value.trim();
            match key.trim() {
                "sample_freq_m" => config.sample_interval_minutes = number("sample_freq_m", value)?,
                "irid_freq_h" => config.transmit_interval_hours = number("irid_freq_h", value)?,
                "onstart_samples" => config.onstart_samples = number("onstart_samples", value)?,
                "test_mode" => config.test_mode = flag("test_mode", value)?,
                "blink_freq_s" => config.blink_interval_secs = number("blink_freq_s", value)?,
                "sync_every_d" => config.clock_sync_every_days = number("sync_every_d", value)?,
                other => warn!("Ignoring unknown parameter {:?}", other),
            }
        }

        config.validate()?;
        debug!("Loaded parameters: {:?}", config);
        Ok(config)
    }

    /// Check every value is in the range the scheduler can honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=60).contains(&self.sample_interval_minutes) {
            return Err(ConfigError::OutOfRange { key: "sample_freq_m" });
        }
        if !(1..=24).contains(&self.transmit_interval_hours) {
            return Err(ConfigError::OutOfRange { key: "irid_freq_h" });
        }
        // Blink boundaries must line up with the minute.
        if !(1..=60).contains(&self.blink_interval_secs) || 60 % self.blink_interval_secs != 0 {
            return Err(ConfigError::OutOfRange { key: "blink_freq_s" });
        }
        if self.clock_sync_every_days == 0 {
            return Err(ConfigError::OutOfRange { key: "sync_every_d" });
        }
        Ok(())
    }
}

fn number(key: &'static str, value: &str) -> Result<u8, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue { key })
}

fn flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key }),
    }
}

/// Hardware settle delays around sensor and modem power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    /// Sensor warm-up after power on, before the read
    pub sensor_warmup_ms: u32,
    /// Wait after the read, before the sensor is released
    pub sensor_cooldown_ms: u32,
    /// Modem power-up settle before the session starts
    pub modem_settle_ms: u32,
}

impl CycleTiming {
    pub const DEFAULT: Self = Self {
        sensor_warmup_ms: 500,
        sensor_cooldown_ms: 50,
        modem_settle_ms: 2000,
    };
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}
