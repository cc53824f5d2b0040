//! Bar granularity.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Granularity of a bar series, from one minute up to one quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour4,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Period {
    pub const ALL: [Period; 10] = [
        Period::Minute1,
        Period::Minute5,
        Period::Minute15,
        Period::Minute30,
        Period::Hour1,
        Period::Hour4,
        Period::Daily,
        Period::Weekly,
        Period::Monthly,
        Period::Quarterly,
    ];

    /// Canonical short label used in config files and logs.
    pub fn label(self) -> &'static str {
        match self {
            Period::Minute1 => "1m",
            Period::Minute5 => "5m",
            Period::Minute15 => "15m",
            Period::Minute30 => "30m",
            Period::Hour1 => "1h",
            Period::Hour4 => "4h",
            Period::Daily => "1d",
            Period::Weekly => "1w",
            Period::Monthly => "1M",
            Period::Quarterly => "1Q",
        }
    }

    /// Directory-safe name. Unlike `label`, it does not rely on case to
    /// tell minutes from months.
    pub fn storage_key(self) -> &'static str {
        match self {
            Period::Minute1 => "1min",
            Period::Minute5 => "5min",
            Period::Minute15 => "15min",
            Period::Minute30 => "30min",
            Period::Hour1 => "1h",
            Period::Hour4 => "4h",
            Period::Daily => "1d",
            Period::Weekly => "1w",
            Period::Monthly => "1mo",
            Period::Quarterly => "1q",
        }
    }

    pub fn from_storage_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.storage_key() == key)
    }

    /// Duration covered by one bar.
    ///
    /// Calendar periods use their longest possible length (31 and 92 days)
    /// so that the value is safe to use as a coverage tolerance.
    pub fn bar_duration(self) -> Duration {
        match self {
            Period::Minute1 => Duration::minutes(1),
            Period::Minute5 => Duration::minutes(5),
            Period::Minute15 => Duration::minutes(15),
            Period::Minute30 => Duration::minutes(30),
            Period::Hour1 => Duration::hours(1),
            Period::Hour4 => Duration::hours(4),
            Period::Daily => Duration::days(1),
            Period::Weekly => Duration::weeks(1),
            Period::Monthly => Duration::days(31),
            Period::Quarterly => Duration::days(92),
        }
    }

    /// Tolerance used when comparing archive boundaries against a request.
    pub fn polling_delta(self) -> Duration {
        self.bar_duration()
    }

    pub fn is_intraday(self) -> bool {
        self.bar_duration() < Duration::days(1)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown period '{0}' (expected one of 1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w, 1M, 1Q)")]
pub struct ParsePeriodError(pub String);

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1M" (month) and "1m" (minute) differ only by case, so match exactly first.
        if let Some(p) = Period::ALL.iter().find(|p| p.label() == s) {
            return Ok(*p);
        }
        match s.to_ascii_lowercase().as_str() {
            "1min" | "minute" => Ok(Period::Minute1),
            "60m" | "hourly" => Ok(Period::Hour1),
            "daily" | "day" => Ok(Period::Daily),
            "weekly" | "week" | "1wk" => Ok(Period::Weekly),
            "monthly" | "month" | "1mo" => Ok(Period::Monthly),
            "quarterly" | "quarter" | "3mo" | "1q" => Ok(Period::Quarterly),
            _ => Err(ParsePeriodError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Period {
    type Error = ParsePeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.label().to_string()
    }
}
