//! Provider trait and structured fetch errors.
//!
//! The Provider trait abstracts over historical-data vendors so the
//! download engine can plan jobs against their capabilities and be
//! exercised with mocks in tests. Providers know nothing about storage.

use crate::domain::{BarTable, Instrument, Period};
use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

/// Errors a provider may raise from `fetch`.
///
/// Only `Transient` is retried; the others are final for the job.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("no data for {symbol} ({period})")]
    NotFound { symbol: String, period: Period },

    #[error("only {rows} rows returned for {symbol} (minimum {min_rows})")]
    LowData {
        symbol: String,
        rows: usize,
        min_rows: usize,
    },

    #[error("provider quota exceeded")]
    QuotaExceeded,

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Capability surface and fetch entry point of a data vendor.
pub trait Provider: Send + Sync {
    /// Human-readable name, recorded in series metadata.
    fn name(&self) -> &str;

    /// Periods this provider can serve.
    fn supported_periods(&self) -> &[Period];

    fn supports(&self, period: Period) -> bool {
        self.supported_periods().contains(&period)
    }

    /// Longest window one request may span for `period`, if limited.
    fn max_request_window(&self, _period: Period) -> Option<Duration> {
        None
    }

    /// Earliest timestamp the provider serves for `period` as of `now`,
    /// if limited.
    fn earliest_start(&self, _period: Period, _now: NaiveDateTime) -> Option<NaiveDateTime> {
        None
    }

    /// Fetch bars for `instrument` over `[start, end]`.
    fn fetch(
        &self,
        instrument: &Instrument,
        period: Period,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BarTable, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(FetchError::Transient("timeout".into()).is_transient());
        assert!(!FetchError::QuotaExceeded.is_transient());
        assert!(!FetchError::NotFound {
            symbol: "SPY".into(),
            period: Period::Daily
        }
        .is_transient());
    }
}
