//! In-memory release store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ReleaseError, Result, StateError};
use crate::release::{Release, ReleaseKey};

use super::store::ReleaseStore;

#[derive(Debug, Default)]
struct History {
    allocated: u64,
    releases: BTreeMap<u64, Release>,
}

/// Release store keeping everything in process memory.
///
/// Used by tests and by one-shot previews that never need history.
#[derive(Debug, Default)]
pub struct MemoryReleaseStore {
    histories: Mutex<HashMap<ReleaseKey, History>>,
}

impl MemoryReleaseStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReleaseStore for MemoryReleaseStore {
    async fn allocate_revision(&self, key: &ReleaseKey) -> Result<u64> {
        key.validate()?;
        let mut histories = self.histories.lock().await;
        let history = histories.entry(key.clone()).or_default();
        history.allocated += 1;
        debug!("Allocated revision {} for {key}", history.allocated);
        Ok(history.allocated)
    }

    async fn save_release(&self, release: &Release) -> Result<()> {
        let key = release.key();
        let mut histories = self.histories.lock().await;
        match histories.get_mut(&key) {
            Some(history) if release.revision != 0 && release.revision <= history.allocated => {
                if history.releases.get(&release.revision).is_some_and(Release::is_terminal) {
                    return Err(ReleaseError::ReleaseFinished {
                        key: key.to_string(),
                        revision: release.revision,
                    }
                    .into());
                }
                history.releases.insert(release.revision, release.clone());
                Ok(())
            }
            _ => Err(ReleaseError::RevisionConflict {
                key: key.to_string(),
                revision: release.revision,
            }
            .into()),
        }
    }

    async fn get_release(&self, key: &ReleaseKey, revision: u64) -> Result<Release> {
        self.histories
            .lock()
            .await
            .get(key)
            .and_then(|h| h.releases.get(&revision))
            .cloned()
            .ok_or_else(|| {
                StateError::ReleaseNotFound {
                    key: key.to_string(),
                    revision,
                }
                .into()
            })
    }

    async fn list_revisions(&self, key: &ReleaseKey) -> Result<Vec<u64>> {
        Ok(self
            .histories
            .lock()
            .await
            .get(key)
            .map(|h| h.releases.keys().copied().collect())
            .unwrap_or_default())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
