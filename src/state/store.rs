//! Release store trait definition.
//!
//! This module defines the common interface for release persistence backends.

use async_trait::async_trait;

use crate::error::Result;
use crate::release::{Release, ReleaseKey};

/// Trait for release persistence backends.
///
/// `allocate_revision` is the only way to obtain a revision. Backends make it
/// atomic per key so concurrent callers never share a revision.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Allocates the next revision for the key, starting at 1.
    async fn allocate_revision(&self, key: &ReleaseKey) -> Result<u64>;

    /// Saves a release, replacing any earlier save of the same revision.
    ///
    /// Fails with `RevisionConflict` if the revision was never allocated and
    /// with `ReleaseFinished` if the saved release is already terminal.
    async fn save_release(&self, release: &Release) -> Result<()>;

    /// Loads one release.
    ///
    /// Fails with `ReleaseNotFound` if it was never saved.
    async fn get_release(&self, key: &ReleaseKey, revision: u64) -> Result<Release>;

    /// Lists saved revisions in ascending order.
    async fn list_revisions(&self, key: &ReleaseKey) -> Result<Vec<u64>>;

    /// Loads the release with the highest saved revision.
    ///
    /// Returns `None` if the key has no releases.
    async fn get_latest_release(&self, key: &ReleaseKey) -> Result<Option<Release>> {
        match self.list_revisions(key).await?.last() {
            Some(&revision) => self.get_release(key, revision).await.map(Some),
            None => Ok(None),
        }
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl ReleaseStore for Box<dyn ReleaseStore> {
    async fn allocate_revision(&self, key: &ReleaseKey) -> Result<u64> {
        (**self).allocate_revision(key).await
    }

    async fn save_release(&self, release: &Release) -> Result<()> {
        (**self).save_release(release).await
    }

    async fn get_release(&self, key: &ReleaseKey, revision: u64) -> Result<Release> {
        (**self).get_release(key, revision).await
    }

    async fn list_revisions(&self, key: &ReleaseKey) -> Result<Vec<u64>> {
        (**self).list_revisions(key).await
    }

    async fn get_latest_release(&self, key: &ReleaseKey) -> Result<Option<Release>> {
        (**self).get_latest_release(key).await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
