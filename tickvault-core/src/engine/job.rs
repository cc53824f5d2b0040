//! A single fetch job: one instrument, one period, one window.

use crate::data::{Provider, Storage};
use crate::domain::{ContractError, Instrument, Period};
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building jobs. These are fatal for the run and
/// never reach the scheduler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job {symbol} ({period}) has start {start} after end {end}")]
    InvalidWindow {
        symbol: String,
        period: Period,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("start year {start} is after end year {end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("year {0} is out of range")]
    InvalidYear(i32),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Everything needed to fetch and archive one window of bars.
///
/// Invariant: `start <= end`, enforced by [`DownloadJob::new`].
#[derive(Clone)]
pub struct DownloadJob {
    provider: Arc<dyn Provider>,
    storage: Arc<dyn Storage>,
    backup: Option<Arc<dyn Storage>>,
    instrument: Instrument,
    period: Period,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DownloadJob {
    pub fn new(
        provider: Arc<dyn Provider>,
        storage: Arc<dyn Storage>,
        instrument: Instrument,
        period: Period,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self, JobError> {
        if start > end {
            return Err(JobError::InvalidWindow {
                symbol: instrument.symbol(),
                period,
                start,
                end,
            });
        }
        Ok(Self {
            provider,
            storage,
            backup: None,
            instrument,
            period,
            start,
            end,
        })
    }

    /// Also persist merged results to `backup`.
    pub fn with_backup(mut self, backup: Option<Arc<dyn Storage>>) -> Self {
        self.backup = backup;
        self
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn backup(&self) -> Option<&dyn Storage> {
        self.backup.as_deref()
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Short human label, e.g. `GCQ25 1d 2025-07-01..2025-08-10`.
    pub fn label(&self) -> String {
        format!(
            "{} {} {}..{}",
            self.instrument.symbol(),
            self.period,
            self.start.date(),
            self.end.date()
        )
    }
}

impl fmt::Debug for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadJob")
            .field("provider", &self.provider.name())
            .field("storage", &self.storage.name())
            .field("backup", &self.backup.as_ref().map(|b| b.name().to_string()))
            .field("instrument", &self.instrument)
            .field("period", &self.period)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FetchError, StorageError};
    use crate::domain::BarTable;
    use chrono::NaiveDate;

    struct NoProvider;

    impl Provider for NoProvider {
        fn name(&self) -> &str {
            "none"
        }
        fn supported_periods(&self) -> &[Period] {
            &[Period::Daily]
        }
        fn fetch(
            &self,
            instrument: &Instrument,
            period: Period,
            _start: NaiveDateTime,
            _end: NaiveDateTime,
        ) -> Result<BarTable, FetchError> {
            Err(FetchError::NotFound {
                symbol: instrument.symbol(),
                period,
            })
        }
    }

    struct NoStorage;

    impl Storage for NoStorage {
        fn name(&self) -> &str {
            "none"
        }
        fn load(&self, symbol: &str, period: Period) -> Result<BarTable, StorageError> {
            Err(StorageError::NotFound {
                symbol: symbol.to_string(),
                period,
            })
        }
        fn persist(&self, _table: &BarTable) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn dt(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn spy() -> Instrument {
        Instrument::Stock {
            id: "SPY".into(),
            symbol: "SPY".into(),
        }
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = DownloadJob::new(
            Arc::new(NoProvider),
            Arc::new(NoStorage),
            spy(),
            Period::Daily,
            dt(8, 1),
            dt(7, 1),
        )
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidWindow { .. }));
    }

    #[test]
    fn single_point_window_is_valid() {
        let job = DownloadJob::new(
            Arc::new(NoProvider),
            Arc::new(NoStorage),
            spy(),
            Period::Daily,
            dt(7, 1),
            dt(7, 1),
        )
        .unwrap();
        assert_eq!(job.label(), "SPY 1d 2025-07-01..2025-07-01");
        assert!(job.backup().is_none());
    }

    #[test]
    fn backup_is_attached() {
        let job = DownloadJob::new(
            Arc::new(NoProvider),
            Arc::new(NoStorage),
            spy(),
            Period::Daily,
            dt(7, 1),
            dt(7, 2),
        )
        .unwrap()
        .with_backup(Some(Arc::new(NoStorage)));
        assert_eq!(job.backup().map(|b| b.name()), Some("none"));
    }
}
