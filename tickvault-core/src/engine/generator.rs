//! Job generation: turn instrument configs and a date range into jobs.
//!
//! Futures expand into dated contracts from their roll cycle; each
//! contract window is intersected with the requested range. Continuous
//! instruments get one window per period, chunked to the provider's
//! maximum request size.

use super::job::{DownloadJob, JobError};
use super::scheduler::JobGroup;
use crate::config::InstrumentConfig;
use crate::data::{Provider, Storage};
use crate::domain::{contract, Contract, FutureContractSpec, Instrument, InstrumentKind, Period};
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tracing::{debug, warn};

/// Jobs generated for one configured instrument.
pub type InstrumentJobs = JobGroup<DownloadJob>;

pub struct JobGenerator {
    provider: Arc<dyn Provider>,
    storage: Arc<dyn Storage>,
    backup: Option<Arc<dyn Storage>>,
    now: NaiveDateTime,
}

impl JobGenerator {
    pub fn new(provider: Arc<dyn Provider>, storage: Arc<dyn Storage>) -> Self {
        Self {
            provider,
            storage,
            backup: None,
            now: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn with_backup(mut self, backup: Option<Arc<dyn Storage>>) -> Self {
        self.backup = backup;
        self
    }

    /// Pin "now", which bounds every window and decides contract status.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// Jobs for `config` covering January 1 of `start_year` through
    /// December 31 of `end_year`.
    pub fn generate(
        &self,
        config: &InstrumentConfig,
        start_year: i32,
        end_year: i32,
    ) -> Result<InstrumentJobs, JobError> {
        if start_year > end_year {
            return Err(JobError::InvalidYearRange {
                start: start_year,
                end: end_year,
            });
        }
        let start = contract::year_start(start_year).ok_or(JobError::InvalidYear(start_year))?;
        let end = contract::year_end(end_year).ok_or(JobError::InvalidYear(end_year))?;
        self.generate_range(config, start, end)
    }

    /// Jobs for `config` covering `[start, end]`.
    pub fn generate_range(
        &self,
        config: &InstrumentConfig,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<InstrumentJobs, JobError> {
        let periods = self.supported_periods(config);
        match config.future_spec() {
            Some(spec) => {
                let jobs = self.future_jobs(&spec, &periods, start, end)?;
                Ok(JobGroup::new(&config.code, spec.roll_cycle.burst_size(), jobs))
            }
            None => {
                let jobs = self.continuous_jobs(config, &periods, start, end)?;
                Ok(JobGroup::new(&config.code, 1, jobs))
            }
        }
    }

    fn supported_periods(&self, config: &InstrumentConfig) -> Vec<Period> {
        config
            .periods
            .iter()
            .copied()
            .filter(|&period| {
                let ok = self.provider.supports(period);
                if !ok {
                    warn!(
                        instrument = %config.code,
                        %period,
                        provider = self.provider.name(),
                        "period not served by provider, skipping"
                    );
                }
                ok
            })
            .collect()
    }

    fn future_jobs(
        &self,
        spec: &FutureContractSpec,
        periods: &[Period],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<DownloadJob>, JobError> {
        let range_end = end.min(self.now);
        let backfill = spec.earliest_start.map(|d| d.and_time(NaiveTime::MIN));
        let tick_floor = spec.tick_date.map(|d| d.and_time(NaiveTime::MIN));

        let mut jobs = Vec::new();
        for c in self.contracts_in_range(spec, start, end)? {
            let window_start = max_of(c.start, [Some(start), backfill]);
            let window_end = c.end.min(range_end);
            if window_start > window_end {
                debug!(contract = %c.symbol(), "window precedes backfill start");
                continue;
            }

            for &period in periods {
                if period.is_intraday() && tick_floor.is_some_and(|t| c.start < t) {
                    debug!(contract = %c.symbol(), %period, "contract predates tick date");
                    continue;
                }
                let job_start =
                    max_of(window_start, [self.provider.earliest_start(period, self.now)]);
                if job_start > window_end {
                    debug!(contract = %c.symbol(), %period, "window precedes provider history");
                    continue;
                }
                jobs.push(self.job(Instrument::Future(c.clone()), period, job_start, window_end)?);
            }
        }
        Ok(jobs)
    }

    fn continuous_jobs(
        &self,
        config: &InstrumentConfig,
        periods: &[Period],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<DownloadJob>, JobError> {
        let instrument = match config.kind {
            InstrumentKind::Forex => Instrument::Forex {
                id: config.code.clone(),
                symbol: config.symbol().to_string(),
            },
            _ => Instrument::Stock {
                id: config.code.clone(),
                symbol: config.symbol().to_string(),
            },
        };
        let backfill = config.backfill_start_date.map(|d| d.and_time(NaiveTime::MIN));
        let tick_floor = config.tick_date.map(|d| d.and_time(NaiveTime::MIN));
        let range_end = end.min(self.now);

        let mut jobs = Vec::new();
        for &period in periods {
            let intraday_floor = if period.is_intraday() { tick_floor } else { None };
            let job_start = max_of(
                start,
                [backfill, intraday_floor, self.provider.earliest_start(period, self.now)],
            );
            if job_start > range_end {
                debug!(instrument = %config.code, %period, "empty window");
                continue;
            }

            let window = self
                .provider
                .max_request_window(period)
                .filter(|w| *w > Duration::zero());
            for (chunk_start, chunk_end) in chunks(job_start, range_end, window) {
                jobs.push(self.job(instrument.clone(), period, chunk_start, chunk_end)?);
            }
        }
        Ok(jobs)
    }

    fn job(
        &self,
        instrument: Instrument,
        period: Period,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<DownloadJob, JobError> {
        Ok(DownloadJob::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.storage),
            instrument,
            period,
            start,
            end,
        )?
        .with_backup(self.backup.clone()))
    }

    /// Contracts of a futures root whose window overlaps `[start, end]`,
    /// with `end` clamped to now.
    pub fn contracts_in_range(
        &self,
        spec: &FutureContractSpec,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Contract>, JobError> {
        let range_end = end.min(self.now);
        let mut out = Vec::new();
        for year in start.year()..=end.year() {
            for c in spec.contracts_for_year(year, self.now)? {
                if c.start.max(start) <= c.end.min(range_end) {
                    out.push(c);
                }
            }
        }
        Ok(out)
    }
}

fn max_of<const N: usize>(base: NaiveDateTime, floors: [Option<NaiveDateTime>; N]) -> NaiveDateTime {
    floors.into_iter().flatten().fold(base, NaiveDateTime::max)
}

/// Split `[start, end]` into consecutive windows no longer than `window`.
fn chunks(
    start: NaiveDateTime,
    end: NaiveDateTime,
    window: Option<Duration>,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let Some(window) = window else {
        return vec![(start, end)];
    };
    let mut out = Vec::new();
    let mut chunk_start = start;
    loop {
        let chunk_end = (chunk_start + window).min(end);
        out.push((chunk_start, chunk_end));
        if chunk_end >= end {
            break;
        }
        chunk_start = chunk_end;
    }
    out
}
