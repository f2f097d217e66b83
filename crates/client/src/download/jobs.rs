//! In-memory registry of download jobs.
//!
//! Jobs writing the same namespace run one at a time; different namespaces,
//! including two generations of one layer, run in parallel. A job counts as
//! active from registration, so a queued job already reports its layer as
//! loading.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct State {
    locks: HashMap<String, Arc<AsyncMutex<()>>>,
    active: HashMap<String, usize>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    /// Held shared while a batch is staged and promoted, exclusively while
    /// the scratch namespace is drained.
    scratch: RwLock<()>,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

/// Registration of one job. Dropping it marks the job finished.
pub struct JobTicket {
    registry: JobRegistry,
    namespace: String,
    scope: Arc<AsyncMutex<()>>,
}

impl JobTicket {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Wait for earlier jobs on the same namespace to finish.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.scope.clone().lock_owned().await
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        let mut state = self.registry.state();
        if let Some(count) = state.active.get_mut(&self.namespace) {
            *count -= 1;
            if *count == 0 {
                state.active.remove(&self.namespace);
            }
        }
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, namespace: &str) -> JobTicket {
        let mut state = self.state();
        *state.active.entry(namespace.to_string()).or_default() += 1;
        let scope = state.locks.entry(namespace.to_string()).or_default().clone();
        JobTicket { registry: self.clone(), namespace: namespace.to_string(), scope }
    }

    /// True while a job for `namespace` is running or queued.
    pub fn is_active(&self, namespace: &str) -> bool {
        self.state().active.contains_key(namespace)
    }

    /// Running and queued jobs across all namespaces.
    pub fn active_jobs(&self) -> usize {
        self.state().active.values().sum()
    }

    pub async fn scratch(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.scratch.read().await
    }

    /// Exclusive scratch access, granted only when the caller's job is the
    /// only one registered and no batch is in flight.
    pub fn lock_if_sole(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        if self.active_jobs() != 1 {
            return None;
        }
        let guard = self.inner.scratch.try_write().ok()?;
        (self.active_jobs() == 1).then_some(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_active_until_dropped() {
        let registry = JobRegistry::new();
        let first = registry.register("overlay-demo_1");
        let second = registry.register("overlay-demo_1");
        assert!(registry.is_active("overlay-demo_1"));
        assert_eq!(registry.active_jobs(), 2);

        drop(first);
        assert!(registry.is_active("overlay-demo_1"));
        drop(second);
        assert!(!registry.is_active("overlay-demo_1"));
        assert_eq!(registry.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_same_namespace_serialized() {
        let registry = JobRegistry::new();
        let first = registry.register("overlay-demo_1");
        let second = registry.register("overlay-demo_1");

        let guard = first.acquire().await;
        let waiting = tokio::time::timeout(Duration::from_millis(20), second.acquire()).await;
        assert!(waiting.is_err());

        drop(guard);
        let acquired = tokio::time::timeout(Duration::from_millis(20), second.acquire()).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_namespaces_concurrent() {
        let registry = JobRegistry::new();
        let overlay = registry.register("overlay-demo_1");
        let next = registry.register("overlay-demo_2");
        let vector = registry.register("vector-cache");

        let _guard = overlay.acquire().await;
        let acquired = tokio::time::timeout(Duration::from_millis(20), next.acquire()).await;
        assert!(acquired.is_ok());
        let acquired = tokio::time::timeout(Duration::from_millis(20), vector.acquire()).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_lock_if_sole() {
        let registry = JobRegistry::new();
        let only = registry.register("overlay-demo_1");
        assert!(registry.lock_if_sole().is_some());

        let other = registry.register("overlay-other_1");
        assert!(registry.lock_if_sole().is_none());
        drop(other);

        let batch = registry.scratch().await;
        assert!(registry.lock_if_sole().is_none());
        drop(batch);
        assert!(registry.lock_if_sole().is_some());
        drop(only);
    }
}
