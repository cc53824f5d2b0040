//! Download orchestrator: drives each scheduled job through
//! load → evaluate → fetch → merge → persist and aggregates the outcomes.
//!
//! Jobs run one at a time in scheduler order. Failures are confined to the
//! job that raised them; only an exhausted call quota stops the batch.

use super::coverage::{self, Coverage};
use super::generator::JobGenerator;
use super::job::{DownloadJob, JobError};
use super::merge::merge;
use super::progress::DownloadProgress;
use super::scheduler::schedule;
use crate::config::InstrumentConfig;
use crate::data::{Allowance, FetchError, Provider, RetryPolicy, Storage, StorageError};
use crate::domain::Period;
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Terminal outcome of a job that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Fetched, merged and persisted.
    Ok,
    /// Stored data already covers the request.
    Exists,
    /// The provider has no data for the window.
    None,
    /// The provider returned fewer rows than it considers viable.
    Low { rows: usize, min_rows: usize },
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Ok => "OK",
            JobOutcome::Exists => "EXISTS",
            JobOutcome::None => "NONE",
            JobOutcome::Low { .. } => "LOW",
        };
        f.write_str(s)
    }
}

/// The step a job failed in.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("load failed: {0}")]
    Load(#[source] StorageError),

    #[error("fetch failed: {0}")]
    Fetch(#[source] FetchError),

    #[error("persist failed: {0}")]
    Persist(#[source] StorageError),
}

/// A failed job, labelled so the error is attributable.
#[derive(Debug, Error)]
#[error("{job}: {error}")]
pub struct JobFailure {
    pub job: String,
    #[source]
    pub error: StepError,
}

/// One entry of the end-of-run low-data report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowDataReport {
    pub job: String,
    pub symbol: String,
    pub period: Period,
    pub rows: usize,
    pub min_rows: usize,
}

/// Summary of a download run.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub total: usize,
    pub ok: usize,
    pub exists: usize,
    pub none: usize,
    pub low: Vec<LowDataReport>,
    pub failures: Vec<JobFailure>,
    /// Jobs left undone when the quota stopped the run, including the
    /// one whose fetch hit the quota.
    pub not_started: usize,
    pub quota_exhausted: bool,
}

impl DownloadSummary {
    fn record(&mut self, job: &DownloadJob, label: &str, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Ok => self.ok += 1,
            JobOutcome::Exists => self.exists += 1,
            JobOutcome::None => self.none += 1,
            JobOutcome::Low { rows, min_rows } => self.low.push(LowDataReport {
                job: label.to_string(),
                symbol: job.instrument().symbol(),
                period: job.period(),
                rows,
                min_rows,
            }),
        }
    }

    /// Jobs that reached a terminal outcome.
    pub fn completed(&self) -> usize {
        self.ok + self.exists + self.none + self.low.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Why a job stopped short of an outcome.
enum Halt {
    Quota,
    Failed(StepError),
}

/// Owns the provider, archive and call allowance for a download run.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    storage: Arc<dyn Storage>,
    backup: Option<Arc<dyn Storage>>,
    allowance: Arc<Allowance>,
    retry: RetryPolicy,
    force: bool,
    now: Option<NaiveDateTime>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, storage: Arc<dyn Storage>) -> Self {
        Self {
            provider,
            storage,
            backup: None,
            allowance: Arc::new(Allowance::unlimited()),
            retry: RetryPolicy::default(),
            force: false,
            now: None,
        }
    }

    pub fn with_backup(mut self, backup: Option<Arc<dyn Storage>>) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_allowance(mut self, allowance: Arc<Allowance>) -> Self {
        self.allowance = allowance;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every job's full window, ignoring stored coverage. The window
    /// is still widened to reach the stored series so that nothing already
    /// archived is dropped by the merge.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Pin "now" for job generation.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn allowance(&self) -> &Allowance {
        &self.allowance
    }

    fn generator(&self) -> JobGenerator {
        let generator = JobGenerator::new(Arc::clone(&self.provider), Arc::clone(&self.storage))
            .with_backup(self.backup.clone());
        match self.now {
            Some(now) => generator.with_now(now),
            None => generator,
        }
    }

    /// Generate and schedule jobs without running them.
    pub fn plan(
        &self,
        configs: &[InstrumentConfig],
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<DownloadJob>, JobError> {
        let generator = self.generator();
        let groups = configs
            .iter()
            .map(|config| generator.generate(config, start_year, end_year))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedule(groups))
    }

    /// Download every configured instrument for the year range.
    ///
    /// Job-level failures and quota exhaustion are reported in the summary;
    /// only invalid job construction is returned as an error.
    pub fn download(
        &self,
        configs: &[InstrumentConfig],
        start_year: i32,
        end_year: i32,
        progress: &dyn DownloadProgress,
    ) -> Result<DownloadSummary, JobError> {
        let jobs = self.plan(configs, start_year, end_year)?;
        info!(
            instruments = configs.len(),
            jobs = jobs.len(),
            start_year,
            end_year,
            provider = self.provider.name(),
            "download planned"
        );
        Ok(self.run(&jobs, progress))
    }

    /// Run already scheduled jobs in order.
    pub fn run(&self, jobs: &[DownloadJob], progress: &dyn DownloadProgress) -> DownloadSummary {
        let total = jobs.len();
        let mut summary = DownloadSummary {
            total,
            ..Default::default()
        };

        for (index, job) in jobs.iter().enumerate() {
            let label = job.label();
            progress.on_start(&label, index, total);

            match self.run_job(job) {
                Ok(outcome) => {
                    info!(job = %label, %outcome, "job finished");
                    summary.record(job, &label, outcome);
                    progress.on_complete(&label, index, total, &Ok(outcome));
                }
                Err(Halt::Failed(error)) => {
                    let failure = JobFailure {
                        job: label.clone(),
                        error,
                    };
                    error!(error = %failure, "job failed");
                    let result = Err(failure);
                    progress.on_complete(&label, index, total, &result);
                    summary.failures.extend(result.err());
                }
                Err(Halt::Quota) => {
                    summary.quota_exhausted = true;
                    summary.not_started = total - index;
                    warn!(
                        not_started = summary.not_started,
                        used = self.allowance.used(),
                        "provider quota exhausted, stopping batch"
                    );
                    progress.on_quota_exhausted(summary.not_started);
                    break;
                }
            }
        }

        info!(
            ok = summary.ok,
            exists = summary.exists,
            none = summary.none,
            low = summary.low.len(),
            failed = summary.failures.len(),
            not_started = summary.not_started,
            "download finished"
        );
        progress.on_batch_complete(&summary);
        summary
    }

    fn run_job(&self, job: &DownloadJob) -> Result<JobOutcome, Halt> {
        let symbol = job.instrument().symbol();
        let period = job.period();

        let existing = match job.storage().load(&symbol, period) {
            Ok(table) => Some(table),
            Err(e) if e.is_not_found() => {
                debug!(%symbol, %period, "no stored series");
                None
            }
            Err(e) => return Err(Halt::Failed(StepError::Load(e))),
        };

        let (start, end) = if self.force {
            coverage::touching(job.start(), job.end(), existing.as_ref().map(|t| t.meta()))
        } else {
            match coverage::evaluate(job.start(), job.end(), existing.as_ref().map(|t| t.meta())) {
                Coverage::Skip(reason) => {
                    debug!(%symbol, %period, ?reason, "stored series covers request");
                    return Ok(JobOutcome::Exists);
                }
                Coverage::Refetch { start, end } => (start, end),
            }
        };

        let fetched = self.retry.run(|attempt| {
            if let Err(e) = self.allowance.try_acquire() {
                warn!(%symbol, error = %e, "call allowance refused");
                return Err(FetchError::QuotaExceeded);
            }
            debug!(%symbol, %period, %start, %end, attempt, "fetching");
            job.provider().fetch(job.instrument(), period, start, end)
        });

        let incoming = match fetched {
            Ok(table) => table,
            Err(FetchError::NotFound { .. }) => return Ok(JobOutcome::None),
            Err(FetchError::LowData { rows, min_rows, .. }) => {
                return Ok(JobOutcome::Low { rows, min_rows })
            }
            Err(FetchError::QuotaExceeded) => {
                self.allowance.trip();
                return Err(Halt::Quota);
            }
            Err(e) => return Err(Halt::Failed(StepError::Fetch(e))),
        };

        let merged = merge(incoming, existing);
        job.storage()
            .persist(&merged)
            .map_err(|e| Halt::Failed(StepError::Persist(e)))?;

        if let Some(backup) = job.backup() {
            if let Err(e) = backup.persist(&merged) {
                warn!(%symbol, %period, backup = backup.name(), error = %e, "backup persist failed");
            }
        }

        debug!(%symbol, %period, bars = merged.len(), "persisted");
        Ok(JobOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(JobOutcome::Ok.to_string(), "OK");
        assert_eq!(JobOutcome::Exists.to_string(), "EXISTS");
        assert_eq!(JobOutcome::None.to_string(), "NONE");
        assert_eq!(JobOutcome::Low { rows: 1, min_rows: 2 }.to_string(), "LOW");
    }

    #[test]
    fn empty_summary_succeeds() {
        let summary = DownloadSummary::default();
        assert!(summary.all_succeeded());
        assert_eq!(summary.completed(), 0);
    }
}
