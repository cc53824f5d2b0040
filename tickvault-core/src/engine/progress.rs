//! Progress callbacks for a download run.

use super::orchestrator::{DownloadSummary, JobFailure, JobOutcome};

/// Progress callback for a batch of download jobs.
pub trait DownloadProgress: Send {
    /// Called before job `index` of `total` starts.
    fn on_start(&self, job: &str, index: usize, total: usize);

    /// Called when a job reaches a terminal outcome or fails.
    fn on_complete(
        &self,
        job: &str,
        index: usize,
        total: usize,
        result: &Result<JobOutcome, JobFailure>,
    );

    /// Called once when the allowance stops the batch early.
    fn on_quota_exhausted(&self, _not_started: usize) {}

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, summary: &DownloadSummary);
}

/// Prints one line per job to stdout.
pub struct StdoutProgress;

impl DownloadProgress for StdoutProgress {
    fn on_start(&self, job: &str, index: usize, total: usize) {
        println!("[{}/{}] {job}", index + 1, total);
    }

    fn on_complete(
        &self,
        job: &str,
        _index: usize,
        _total: usize,
        result: &Result<JobOutcome, JobFailure>,
    ) {
        match result {
            Ok(outcome) => println!("  {outcome}: {job}"),
            Err(e) => println!("  FAIL: {e}"),
        }
    }

    fn on_quota_exhausted(&self, not_started: usize) {
        println!("\nProvider quota exhausted, {not_started} jobs not started");
    }

    fn on_batch_complete(&self, summary: &DownloadSummary) {
        println!(
            "\nDownload complete: {} ok, {} exists, {} none, {} low, {} failed, {} not started",
            summary.ok,
            summary.exists,
            summary.none,
            summary.low.len(),
            summary.failures.len(),
            summary.not_started
        );
        for low in &summary.low {
            println!("  LOW: {} {} ({} rows, minimum {})", low.symbol, low.period, low.rows, low.min_rows);
        }
    }
}

/// Reports nothing.
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_start(&self, _job: &str, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _job: &str,
        _index: usize,
        _total: usize,
        _result: &Result<JobOutcome, JobFailure>,
    ) {
    }

    fn on_batch_complete(&self, _summary: &DownloadSummary) {}
}
