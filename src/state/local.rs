//! Local file-based release storage backend.
//!
//! Releases are stored as JSON files under
//! `<base>/releases/<project>/<workspace>/<stack>/<revision>.json`. The
//! revision counter lives next to them and is only touched while holding an
//! exclusive OS file lock, so separate processes sharing the directory never
//! hand out the same revision.

use async_trait::async_trait;
use fs2::FileExt;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{KeelError, ReleaseError, Result, StateError};
use crate::release::{Release, ReleaseKey};

use super::store::ReleaseStore;

/// Default state directory name.
const STATE_DIR: &str = ".keel";

/// Directory holding every release history.
const RELEASES_DIR: &str = "releases";

/// Revision counter file name.
const REVISION_FILE: &str = "revision";

/// Lock file guarding the revision counter.
const REVISION_LOCK_FILE: &str = "revision.lock";

/// Extension of release files.
const RELEASE_EXTENSION: &str = "json";

/// Local file-based release store.
#[derive(Debug, Clone)]
pub struct LocalReleaseStore {
    /// Base directory for state files.
    base_dir: PathBuf,
}

impl LocalReleaseStore {
    /// Creates a store under `.keel` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| KeelError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn key_dir(&self, key: &ReleaseKey) -> Result<PathBuf> {
        key.validate()?;
        Ok(self
            .base_dir
            .join(RELEASES_DIR)
            .join(&key.project)
            .join(&key.workspace)
            .join(&key.stack))
    }

    fn release_path(dir: &Path, revision: u64) -> PathBuf {
        dir.join(format!("{revision}.{RELEASE_EXTENSION}"))
    }
}

/// Reads the counter; a missing file means nothing was allocated yet.
fn read_counter(dir: &Path) -> std::result::Result<u64, StateError> {
    match std::fs::read_to_string(dir.join(REVISION_FILE)) {
        Ok(content) => content.trim().parse().map_err(|e| StateError::Corrupted {
            message: format!("Invalid revision counter in {}: {e}", dir.display()),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(StateError::local(format!("Failed to read revision counter: {e}"))),
    }
}

/// Increments the counter. Caller must hold the revision lock.
fn bump_counter(dir: &Path) -> std::result::Result<u64, StateError> {
    let next = read_counter(dir)?
        .checked_add(1)
        .ok_or_else(|| StateError::Corrupted {
            message: String::from("Revision counter overflow"),
        })?;

    let temp_path = dir.join(format!("{REVISION_FILE}.tmp"));
    std::fs::write(&temp_path, next.to_string())
        .map_err(|e| StateError::local(format!("Failed to write revision counter: {e}")))?;
    std::fs::rename(&temp_path, dir.join(REVISION_FILE))
        .map_err(|e| StateError::local(format!("Failed to rename revision counter: {e}")))?;
    Ok(next)
}

fn allocate_locked(dir: &Path) -> std::result::Result<u64, StateError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| StateError::local(format!("Failed to create release directory: {e}")))?;

    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(dir.join(REVISION_LOCK_FILE))
        .map_err(|e| StateError::LockFailed {
            message: format!("Failed to open revision lock: {e}"),
        })?;

    lock_file.lock_exclusive().map_err(|e| StateError::LockFailed {
        message: format!("Failed to lock revision counter: {e}"),
    })?;

    // The lock is released when `lock_file` is dropped.
    bump_counter(dir)
}

#[async_trait]
impl ReleaseStore for LocalReleaseStore {
    async fn allocate_revision(&self, key: &ReleaseKey) -> Result<u64> {
        let dir = self.key_dir(key)?;
        let revision = tokio::task::spawn_blocking(move || allocate_locked(&dir))
            .await
            .map_err(|e| KeelError::internal(format!("Revision allocation task failed: {e}")))??;

        info!("Allocated revision {revision} for {key}");
        Ok(revision)
    }

    async fn save_release(&self, release: &Release) -> Result<()> {
        let key = release.key();
        let dir = self.key_dir(&key)?;

        let allocated = read_counter(&dir)?;
        if release.revision == 0 || release.revision > allocated {
            return Err(ReleaseError::RevisionConflict {
                key: key.to_string(),
                revision: release.revision,
            }
            .into());
        }

        let path = Self::release_path(&dir, release.revision);
        match self.get_release(&key, release.revision).await {
            Ok(stored) if stored.is_terminal() => {
                return Err(ReleaseError::ReleaseFinished {
                    key: key.to_string(),
                    revision: release.revision,
                }
                .into());
            }
            Ok(_) | Err(KeelError::State(StateError::ReleaseNotFound { .. })) => {}
            Err(e) => return Err(e),
        }
        debug!("Saving release to: {}", path.display());

        let content = serde_json::to_string_pretty(release)
            .map_err(|e| StateError::serialization(format!("Failed to serialize release: {e}")))?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::local(format!("Failed to create temp release file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::local(format!("Failed to write release file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::local(format!("Failed to sync release file: {e}")))?;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StateError::local(format!("Failed to rename release file: {e}")))?;

        info!(phase = %release.phase, "Saved release {} of {key}", release.revision);
        Ok(())
    }

    async fn get_release(&self, key: &ReleaseKey, revision: u64) -> Result<Release> {
        let path = Self::release_path(&self.key_dir(key)?, revision);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StateError::ReleaseNotFound {
                    key: key.to_string(),
                    revision,
                }
                .into());
            }
            Err(e) => return Err(StateError::local(format!("Failed to read release file: {e}")).into()),
        };

        let release: Release = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse {}: {e}", path.display()),
        })?;
        Ok(release)
    }

    async fn list_revisions(&self, key: &ReleaseKey) -> Result<Vec<u64>> {
        let dir = self.key_dir(key)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::local(format!("Failed to list releases: {e}")).into()),
        };

        let mut revisions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateError::local(format!("Failed to list releases: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RELEASE_EXTENSION) {
                continue;
            }
            if let Some(revision) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                revisions.push(revision);
            }
        }

        revisions.sort_unstable();
        Ok(revisions)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
