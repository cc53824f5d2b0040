//! TOML configuration: download settings and the instrument list.

use crate::data::{Allowance, Backoff, RetryPolicy};
use crate::domain::{FutureContractSpec, InstrumentKind, Period, RollCycle};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 360;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(String),

    #[error("invalid instrument '{code}': {reason}")]
    InvalidInstrument { code: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-instrument download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Instrument id; the root for futures (e.g. `GC`).
    pub code: String,
    pub kind: InstrumentKind,
    /// Provider symbol for continuous instruments. Defaults to `code`.
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub roll_cycle: Option<RollCycle>,
    #[serde(default)]
    pub exchange: Option<String>,
    pub periods: Vec<Period>,
    /// Intraday bars before this date are not requested.
    #[serde(default)]
    pub tick_date: Option<NaiveDate>,
    #[serde(default)]
    pub backfill_start_date: Option<NaiveDate>,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}

impl InstrumentConfig {
    pub fn symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.code)
    }

    /// Contract spec for futures; `None` for continuous instruments or a
    /// future without a roll cycle (rejected by `validate`).
    pub fn future_spec(&self) -> Option<FutureContractSpec> {
        if self.kind != InstrumentKind::Future {
            return None;
        }
        Some(FutureContractSpec {
            root: self.code.clone(),
            roll_cycle: self.roll_cycle.clone()?,
            tick_date: self.tick_date,
            earliest_start: self.backfill_start_date,
            lookback_days: self.lookback_days,
            exchange: self.exchange.clone(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidInstrument {
            code: self.code.clone(),
            reason: reason.to_string(),
        };

        if self.code.trim().is_empty() {
            return Err(ConfigError::Invalid("instrument code is empty".into()));
        }
        if self.periods.is_empty() {
            return Err(invalid("no periods configured"));
        }
        if self.kind == InstrumentKind::Future && self.roll_cycle.is_none() {
            return Err(invalid("futures need a roll_cycle"));
        }
        if self.kind != InstrumentKind::Future && self.roll_cycle.is_some() {
            return Err(invalid("roll_cycle is only valid for futures"));
        }
        if self.lookback_days <= 0 {
            return Err(invalid("lookback_days must be positive"));
        }
        Ok(())
    }
}

/// Run-wide download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub data_dir: PathBuf,
    pub backup_dir: Option<PathBuf>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    /// Provider calls per day; unlimited when absent.
    pub daily_allowance: Option<u32>,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Minimum rows a response must carry; below it the job reports LOW.
    pub min_rows: Option<usize>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            backup_dir: None,
            start_year: None,
            end_year: None,
            daily_allowance: None,
            max_attempts: 4,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            min_rows: None,
        }
    }
}

impl DownloadSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Exponential {
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                jitter: true,
            },
        )
    }

    pub fn allowance(&self) -> Allowance {
        match self.daily_allowance {
            Some(limit) => Allowance::daily(limit),
            None => Allowance::unlimited(),
        }
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

impl AppConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for inst in &self.instruments {
            inst.validate()?;
            if !seen.insert(inst.code.as_str()) {
                return Err(ConfigError::InvalidInstrument {
                    code: inst.code.clone(),
                    reason: "duplicate instrument code".into(),
                });
            }
        }
        if let (Some(start), Some(end)) = (self.download.start_year, self.download.end_year) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "start_year {start} is after end_year {end}"
                )));
            }
        }
        Ok(())
    }

    /// Instruments whose code is in `codes`; all of them when `codes` is empty.
    pub fn select(&self, codes: &[String]) -> Result<Vec<InstrumentConfig>, ConfigError> {
        if codes.is_empty() {
            return Ok(self.instruments.clone());
        }
        codes
            .iter()
            .map(|code| {
                self.instruments
                    .iter()
                    .find(|i| i.code.eq_ignore_ascii_case(code))
                    .cloned()
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown instrument '{code}'")))
            })
            .collect()
    }
}
