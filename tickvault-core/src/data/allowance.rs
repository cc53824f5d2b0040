//! Provider call allowance.
//!
//! Vendors cap the number of historical-data requests per day. The
//! allowance counts calls within a rolling window and refuses further
//! calls once the limit is reached. A vendor-reported quota breach
//! exhausts it immediately for the rest of the window.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("call allowance exhausted ({used}/{limit} used, resets in {}s)", reset_in.as_secs())]
pub struct AllowanceExhausted {
    pub used: u32,
    pub limit: u32,
    pub reset_in: Duration,
}

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    used: u32,
    tripped: bool,
}

/// Shared call counter for one provider.
///
/// `try_acquire` is a single locked read-check-increment, so one
/// allowance can be shared by concurrent workers.
#[derive(Debug)]
pub struct Allowance {
    limit: Option<u32>,
    period: Duration,
    window: Mutex<Window>,
}

impl Allowance {
    /// Allow `limit` calls per `period`.
    pub fn new(limit: u32, period: Duration) -> Self {
        Self::build(Some(limit), period)
    }

    /// Daily allowance of `limit` calls.
    pub fn daily(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(24 * 60 * 60))
    }

    /// No counting limit; only a vendor-reported breach stops calls.
    pub fn unlimited() -> Self {
        Self::build(None, Duration::from_secs(24 * 60 * 60))
    }

    fn build(limit: Option<u32>, period: Duration) -> Self {
        Self {
            limit,
            period,
            window: Mutex::new(Window {
                opened_at: Instant::now(),
                used: 0,
                tripped: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        // A poisoned counter is still a valid counter.
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn roll(&self, window: &mut Window) {
        if window.opened_at.elapsed() >= self.period {
            window.opened_at = Instant::now();
            window.used = 0;
            window.tripped = false;
        }
    }

    /// Reserve one call, or report why none is available.
    pub fn try_acquire(&self) -> Result<(), AllowanceExhausted> {
        let mut window = self.lock();
        self.roll(&mut window);

        let at_limit = self.limit.is_some_and(|limit| window.used >= limit);
        if window.tripped || at_limit {
            return Err(AllowanceExhausted {
                used: window.used,
                limit: self.limit.unwrap_or(window.used),
                reset_in: self.period.saturating_sub(window.opened_at.elapsed()),
            });
        }
        window.used += 1;
        Ok(())
    }

    /// Mark the allowance as spent until the window rolls over.
    pub fn trip(&self) {
        let mut window = self.lock();
        window.tripped = true;
    }

    pub fn is_available(&self) -> bool {
        let mut window = self.lock();
        self.roll(&mut window);
        !window.tripped && self.limit.map_or(true, |limit| window.used < limit)
    }

    /// Calls made in the current window.
    pub fn used(&self) -> u32 {
        let mut window = self.lock();
        self.roll(&mut window);
        window.used
    }

    /// Calls left in the current window, `None` when uncounted.
    pub fn remaining(&self) -> Option<u32> {
        let used = self.used();
        self.limit.map(|limit| limit.saturating_sub(used))
    }
}
