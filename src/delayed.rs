//! The delayed-job min-heap (C2).
//!
//! Backs both one-shot `schedule_delayed` jobs and the self-rescheduling
//! wrapper behind `schedule_recurring` (see [`crate::scheduler`]). Keyed on
//! release instant; ties break on insertion order so that two jobs due at
//! the same instant promote in submission order.
//!
//! Cancellation by job id is an O(n) scan-and-rebuild rather than an
//! index-tracked heap swap — heap sizes in the intended workload are small,
//! and a full rebuild is simpler to keep correct than maintaining a
//! secondary index into `BinaryHeap`'s internal layout.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::job::{JobId, JobRecord};

struct Entry {
    release_at: Instant,
    sequence: u64,
    job: JobRecord,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.release_at == other.release_at && self.sequence == other.sequence
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap`, a max-heap, surfaces the earliest
        // release instant first.
        other
            .release_at
            .cmp(&self.release_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub(crate) struct DelayedHeap {
    entries: BinaryHeap<Entry>,
    next_sequence: u64,
}

impl DelayedHeap {
    pub fn new() -> Self {
        DelayedHeap {
            entries: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub fn insert(&mut self, job: JobRecord, release_at: Instant) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push(Entry {
            release_at,
            sequence,
            job,
        });
    }

    /// Pop every entry whose release instant has passed.
    pub fn pop_all_due(&mut self, now: Instant) -> Vec<JobRecord> {
        let mut due = Vec::new();
        while let Some(top) = self.entries.peek() {
            if top.release_at > now {
                break;
            }
            due.push(self.entries.pop().unwrap().job);
        }
        due
    }

    /// Remove a pending entry by job id, if present.
    pub fn remove(&mut self, id: JobId) -> bool {
        let before = self.entries.len();
        let remaining: BinaryHeap<Entry> = self
            .entries
            .drain()
            .filter(|entry| entry.job.id != id)
            .collect();
        self.entries = remaining;
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether a job with this id is currently pending. O(n) — diagnostics
    /// only, matching `PriorityQueue::contains`.
    pub fn contains(&self, id: JobId) -> bool {
        self.entries.iter().any(|entry| entry.job.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release instant of the next entry to come due, if any.
    pub fn next_release(&self) -> Option<Instant> {
        self.entries.peek().map(|e| e.release_at)
    }
}
