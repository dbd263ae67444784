//! The multi-priority submission queue (C1).
//!
//! Four independent FIFO bands, scanned highest-to-lowest at dequeue. The
//! external contract is just that ordering; a mutex-protected array of
//! `VecDeque`s is the simplest structure that satisfies it and is the
//! implementation chosen here (see `SPEC_FULL.md` §9 for the two source
//! variants this deliberately does not reproduce).

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::job::{JobRecord, Priority};

pub(crate) struct PriorityQueue {
    bands: Mutex<[VecDeque<JobRecord>; Priority::BAND_COUNT]>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        PriorityQueue {
            bands: Mutex::new([
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
            ]),
        }
    }

    /// Push a job onto the back of its priority band.
    pub fn push(&self, job: JobRecord) {
        let band = job.options.priority.band_index();
        self.bands.lock()[band].push_back(job);
    }

    /// Pop the front job of the highest non-empty band.
    pub fn pop(&self) -> Option<JobRecord> {
        let mut bands = self.bands.lock();
        for band in bands.iter_mut() {
            if let Some(job) = band.pop_front() {
                return Some(job);
            }
        }
        None
    }

    /// Total number of jobs across every band.
    pub fn len(&self) -> usize {
        self.bands.lock().iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a job with this id is currently sitting in the queue.
    /// O(n) — used only for diagnostics (`get_result`'s NotComplete/Unknown
    /// distinction), never on the dispatch hot path.
    pub fn contains(&self, id: crate::job::JobId) -> bool {
        self.bands
            .lock()
            .iter()
            .any(|band| band.iter().any(|job| job.id == id))
    }

    /// Drop every queued job, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut bands = self.bands.lock();
        let mut total = 0;
        for band in bands.iter_mut() {
            total += band.len();
            band.clear();
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SubmitOptions;
    use std::sync::Weak;

    fn job_with(priority: Priority) -> JobRecord {
        let options = SubmitOptions::builder().priority(priority).build();
        JobRecord::new(
            Arc::new(|| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
            options,
            Weak::new(),
        )
    }

    use std::sync::Arc;

    #[test]
    fn strict_priority_across_bands() {
        let q = PriorityQueue::new();
        q.push(job_with(Priority::Normal));
        q.push(job_with(Priority::Critical));
        q.push(job_with(Priority::Low));
        q.push(job_with(Priority::High));

        let order: Vec<Priority> = std::iter::from_fn(|| q.pop())
            .map(|j| j.options.priority)
            .collect();
        assert_eq!(
            order,
            vec![Priority::Critical, Priority::High, Priority::Normal, Priority::Low]
        );
    }

    #[test]
    fn fifo_within_a_band() {
        let q = PriorityQueue::new();
        let first = job_with(Priority::Normal);
        let first_id = first.id;
        q.push(first);
        q.push(job_with(Priority::Normal));

        let dequeued = q.pop().unwrap();
        assert_eq!(dequeued.id, first_id);
    }

    #[test]
    fn clear_reports_discarded_count() {
        let q = PriorityQueue::new();
        q.push(job_with(Priority::Normal));
        q.push(job_with(Priority::High));
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
    }
}
