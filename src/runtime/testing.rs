//! In-memory runtime used by tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Runtime;
use crate::error::BackendError;
use crate::resource::Resource;

/// Runtime that records calls and keeps live resources in memory.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    cancel_on: HashMap<String, CancellationToken>,
    calls: Mutex<Vec<String>>,
    live: Mutex<HashMap<String, Resource>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRuntime {
    /// Creates a runtime that succeeds immediately for every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call for the ID fail.
    pub fn fail_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Delays every call for the ID.
    pub fn delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    /// Cancels the token once a call for the ID completes.
    pub fn cancel_on(mut self, id: &str, token: CancellationToken) -> Self {
        self.cancel_on.insert(id.to_string(), token);
        self
    }

    /// Seeds a live resource.
    pub fn with_live(self, resource: Resource) -> Self {
        self.live
            .lock()
            .expect("live lock")
            .insert(resource.id.clone(), resource);
        self
    }

    /// Returns the recorded calls as `verb:id`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Returns the live resource IDs, sorted.
    pub fn live_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.live.lock().expect("live lock").keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the highest number of concurrent calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, verb: &str, id: &str) -> Result<(), BackendError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{verb}:{id}"));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(token) = self.cancel_on.get(id) {
            token.cancel();
        }

        if self.failing.contains(id) {
            return Err(BackendError::action_failed(id, verb, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn apply(&self, resource: &Resource) -> Result<Resource, BackendError> {
        self.enter("apply", &resource.id).await?;
        self.live
            .lock()
            .expect("live lock")
            .insert(resource.id.clone(), resource.clone());
        Ok(resource.clone())
    }

    async fn delete(&self, resource: &Resource) -> Result<(), BackendError> {
        self.enter("delete", &resource.id).await?;
        self.live.lock().expect("live lock").remove(&resource.id);
        Ok(())
    }

    async fn read(&self, resource: &Resource) -> Result<Option<Resource>, BackendError> {
        Ok(self.live.lock().expect("live lock").get(&resource.id).cloned())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
