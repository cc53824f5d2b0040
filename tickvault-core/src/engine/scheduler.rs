//! Fair execution order across instruments.
//!
//! Jobs are grouped per instrument. Groups are visited round-robin and each
//! visit takes a burst of jobs proportional to the instrument's roll-cycle
//! density, newest job first. An interrupted run has therefore made
//! progress on every instrument, and no instrument spends the call quota
//! before the others are touched.

use std::collections::VecDeque;

/// Jobs of one instrument, in generation order.
#[derive(Debug, Clone)]
pub struct JobGroup<T> {
    pub instrument_id: String,
    /// Jobs taken per round-robin visit. Zero is treated as one.
    pub burst: usize,
    pub jobs: Vec<T>,
}

impl<T> JobGroup<T> {
    pub fn new(instrument_id: impl Into<String>, burst: usize, jobs: Vec<T>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            burst,
            jobs,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Flatten groups into one execution order.
///
/// Groups sharing an instrument id are joined, in first-appearance order.
/// Every input job appears exactly once in the output.
pub fn schedule<T>(groups: Vec<JobGroup<T>>) -> Vec<T> {
    let mut queues: Vec<(String, usize, VecDeque<T>)> = Vec::new();
    for group in groups {
        match queues.iter_mut().find(|(id, _, _)| *id == group.instrument_id) {
            Some((_, burst, queue)) => {
                *burst = (*burst).max(group.burst);
                queue.extend(group.jobs);
            }
            None => queues.push((group.instrument_id, group.burst, group.jobs.into())),
        }
    }

    let total = queues.iter().map(|(_, _, q)| q.len()).sum();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for (_, burst, queue) in queues.iter_mut() {
            for _ in 0..(*burst).max(1) {
                // Newest job sits at the back of the queue.
                match queue.pop_back() {
                    Some(job) => out.push(job),
                    None => break,
                }
            }
        }
    }
    out
}
