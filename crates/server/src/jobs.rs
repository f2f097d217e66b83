//! Cancellation handles for downloads started through the tool interface.
//!
//! All jobs targeting one namespace share a token, so `layer_cancel` stops
//! the running job and everything queued behind it. The entry is removed on
//! cancel, and later jobs get a fresh token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tilesync_client::CancellationToken;

struct Entry {
    token: CancellationToken,
    generation: u64,
    jobs: usize,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

#[derive(Default)]
pub struct DownloadTracker {
    state: Mutex<State>,
}

/// A tracked job. Dropping it releases the namespace's token.
pub struct TrackedJob {
    tracker: Arc<DownloadTracker>,
    namespace: String,
    generation: u64,
    token: CancellationToken,
}

impl TrackedJob {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for TrackedJob {
    fn drop(&mut self) {
        let mut state = self.tracker.state();
        let Some(entry) = state.entries.get_mut(&self.namespace) else {
            return;
        };
        // after a cancel the namespace may already track a newer generation
        if entry.generation != self.generation {
            return;
        }
        entry.jobs -= 1;
        if entry.jobs == 0 {
            state.entries.remove(&self.namespace);
        }
    }
}

impl DownloadTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(self: &Arc<Self>, namespace: &str) -> TrackedJob {
        let mut state = self.state();
        let generation = state.next_generation;
        let entry = state.entries.entry(namespace.to_string()).or_insert_with(|| Entry {
            token: CancellationToken::new(),
            generation,
            jobs: 0,
        });
        entry.jobs += 1;
        let (generation, token) = (entry.generation, entry.token.clone());
        state.next_generation += 1;

        TrackedJob { tracker: self.clone(), namespace: namespace.to_string(), generation, token }
    }

    /// Cancel every job tracked for `namespace`. Returns how many were signalled.
    pub fn cancel(&self, namespace: &str) -> usize {
        match self.state().entries.remove(namespace) {
            Some(entry) => {
                entry.token.cancel();
                entry.jobs
            }
            None => 0,
        }
    }

    #[cfg(test)]
    pub fn tracked(&self, namespace: &str) -> usize {
        self.state().entries.get(namespace).map_or(0, |entry| entry.jobs)
    }
}
