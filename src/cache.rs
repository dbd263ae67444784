//! The result cache (C6).
//!
//! Maps a finished job's id to its [`Outcome`]. Guarded by its own mutex,
//! distinct from the pool's central lock, so that result reads never
//! contend with submission or dispatch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::job::{JobId, Outcome};

pub(crate) struct ResultCache {
    entries: Mutex<HashMap<JobId, Outcome>>,
}

impl ResultCache {
    pub fn new() -> Self {
        ResultCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, id: JobId, outcome: Outcome) {
        self.entries.lock().insert(id, outcome);
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn with_outcome<R>(&self, id: JobId, f: impl FnOnce(&Outcome) -> R) -> Option<R> {
        self.entries.lock().get(&id).map(f)
    }

    pub fn remove(&self, id: JobId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    pub fn remove_many(&self, ids: &[JobId]) -> usize {
        let mut entries = self.entries.lock();
        ids.iter().filter(|id| entries.remove(id).is_some()).count()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Evict entries whose `finished_at` is older than `max_age`, measured
    /// from `now`. Returns the number evicted.
    pub fn evict_older_than(&self, max_age: Duration, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, outcome| now.saturating_duration_since(outcome.finished_at) < max_age);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
