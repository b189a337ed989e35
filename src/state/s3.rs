//! S3-based release storage backend.
//!
//! Layout under the configured prefix:
//!
//! - `releases/<project>/<workspace>/<stack>/<revision>.json` holds a release.
//! - `releases/<project>/<workspace>/<stack>/revisions/<revision>` is the
//!   claim marker of an allocated revision.
//!
//! Claims are written with `If-None-Match: *`, so S3 itself arbitrates between
//! concurrent allocators: exactly one writer creates a given marker.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info, warn};

use crate::error::{KeelError, ReleaseError, Result, StateError};
use crate::release::{Release, ReleaseKey};

use super::store::ReleaseStore;

/// Directory holding every release history.
const RELEASES_DIR: &str = "releases";

/// Directory of revision claim markers inside a release history.
const REVISIONS_DIR: &str = "revisions";

/// Upper bound on claim attempts within one allocation.
const MAX_CLAIM_ATTEMPTS: u32 = 64;

/// HTTP statuses S3 returns when a conditional write loses the race.
const CONFLICT_STATUSES: [u16; 2] = [409, 412];

/// S3-based release store.
#[derive(Debug)]
pub struct S3ReleaseStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix, empty or ending with `/`.
    prefix: String,
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    prefix
        .map(|p| {
            let p = p.trim_matches('/');
            if p.is_empty() {
                String::new()
            } else {
                format!("{p}/")
            }
        })
        .unwrap_or_default()
}

/// Returns the object key directory of a release history, ending with `/`.
fn history_dir(prefix: &str, key: &ReleaseKey) -> String {
    format!(
        "{prefix}{RELEASES_DIR}/{}/{}/{}/",
        key.project, key.workspace, key.stack
    )
}

/// Extracts the revision from a `<dir><revision>.json` object key.
fn revision_from_release_key(dir: &str, object_key: &str) -> Option<u64> {
    object_key
        .strip_prefix(dir)?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Extracts the revision from a `<dir>revisions/<revision>` object key.
fn revision_from_claim_key(dir: &str, object_key: &str) -> Option<u64> {
    object_key
        .strip_prefix(dir)?
        .strip_prefix(REVISIONS_DIR)?
        .strip_prefix('/')?
        .parse()
        .ok()
}

impl S3ReleaseStore {
    /// Creates a new S3 release store.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be initialized.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Result<Self> {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Ok(Self::with_client(Client::new(&config), bucket, prefix))
    }

    /// Creates a new S3 release store with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
        }
    }

    fn dir(&self, key: &ReleaseKey) -> Result<String> {
        key.validate()?;
        Ok(history_dir(&self.prefix, key))
    }

    /// Lists every object key under a prefix, following continuation tokens.
    async fn list_keys(&self, prefix: &str, delimited: bool) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take());
            if delimited {
                request = request.delimiter("/");
            }

            let response = request
                .send()
                .await
                .map_err(|e| StateError::s3(format!("S3 list error: {}", e.into_service_error())))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    /// Gets an object from S3.
    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| StateError::s3(format!("Failed to read S3 object: {e}")))?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| StateError::Corrupted {
                    message: format!("Invalid UTF-8 in S3 object: {e}"),
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(StateError::s3(format!("S3 get error: {service_err}")).into())
                }
            }
        }
    }

    /// Checks if an object exists in S3.
    async fn object_exists(&self, key: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StateError::s3(format!("S3 head error: {service_err}")).into())
                }
            }
        }
    }

    /// Creates a claim marker unless it already exists.
    ///
    /// Returns `false` if another writer holds the claim.
    async fn try_claim(&self, claim_key: &str) -> Result<bool> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(claim_key)
            .if_none_match("*")
            .body(ByteStream::from_static(b""))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let status = sdk_err.raw_response().map(|r| r.status().as_u16());
                if status.is_some_and(|s| CONFLICT_STATUSES.contains(&s)) {
                    debug!("Revision claim {claim_key} already taken");
                    Ok(false)
                } else {
                    Err(StateError::s3(format!("S3 claim error: {}", sdk_err.into_service_error())).into())
                }
            }
        }
    }

    async fn highest_claim(&self, dir: &str) -> Result<u64> {
        let claims_prefix = format!("{dir}{REVISIONS_DIR}/");
        Ok(self
            .list_keys(&claims_prefix, false)
            .await?
            .iter()
            .filter_map(|k| revision_from_claim_key(dir, k))
            .max()
            .unwrap_or(0))
    }
}

#[async_trait]
impl ReleaseStore for S3ReleaseStore {
    async fn allocate_revision(&self, key: &ReleaseKey) -> Result<u64> {
        let dir = self.dir(key)?;
        let mut candidate = self.highest_claim(&dir).await? + 1;

        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let claim_key = format!("{dir}{REVISIONS_DIR}/{candidate}");
            if self.try_claim(&claim_key).await? {
                info!("Allocated revision {candidate} for {key}");
                return Ok(candidate);
            }
            candidate += 1;
        }

        warn!("Gave up allocating a revision for {key} after {MAX_CLAIM_ATTEMPTS} attempts");
        Err(StateError::LockFailed {
            message: format!("Too much contention allocating a revision for {key}"),
        }
        .into())
    }

    async fn save_release(&self, release: &Release) -> Result<()> {
        let key = release.key();
        let dir = self.dir(&key)?;

        let claim_key = format!("{dir}{REVISIONS_DIR}/{}", release.revision);
        if !self.object_exists(&claim_key).await? {
            return Err(ReleaseError::RevisionConflict {
                key: key.to_string(),
                revision: release.revision,
            }
            .into());
        }

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

        let object_key = format!("{dir}{}.json", release.revision);
        info!("Saving release to s3://{}/{object_key}", self.bucket);

        let content = serde_json::to_string_pretty(release)
            .map_err(|e| StateError::serialization(format!("Failed to serialize release: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(content.into_bytes().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StateError::s3(format!("S3 put error: {}", e.into_service_error())))?;

        debug!(phase = %release.phase, "Release saved successfully to S3");
        Ok(())
    }

    async fn get_release(&self, key: &ReleaseKey, revision: u64) -> Result<Release> {
        let object_key = format!("{}{revision}.json", self.dir(key)?);
        debug!("Loading release from s3://{}/{object_key}", self.bucket);

        let content = self
            .get_object(&object_key)
            .await?
            .ok_or_else(|| StateError::ReleaseNotFound {
                key: key.to_string(),
                revision,
            })?;

        let release: Release = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse release {object_key}: {e}"),
        })?;
        Ok(release)
    }

    async fn list_revisions(&self, key: &ReleaseKey) -> Result<Vec<u64>> {
        let dir = self.dir(key)?;
        let mut revisions: Vec<u64> = self
            .list_keys(&dir, true)
            .await?
            .iter()
            .filter_map(|k| revision_from_release_key(&dir, k))
            .collect();
        revisions.sort_unstable();
        Ok(revisions)
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(normalize_prefix(None), "");
        assert_eq!(normalize_prefix(Some("/")), "");
        assert_eq!(normalize_prefix(Some("/team/keel/")), "team/keel/");
    }

    #[test]
    fn test_history_layout() {
        let key = ReleaseKey::new("app", "dev", "main");
        assert_eq!(history_dir("state/", &key), "state/releases/app/dev/main/");
        assert_eq!(history_dir("", &key), "releases/app/dev/main/");
    }

    #[test]
    fn test_revision_parsing() {
        let dir = "releases/app/dev/main/";
        assert_eq!(revision_from_release_key(dir, "releases/app/dev/main/12.json"), Some(12));
        assert_eq!(revision_from_release_key(dir, "releases/app/dev/main/12.json.tmp"), None);
        assert_eq!(revision_from_release_key(dir, "releases/app/dev/other/1.json"), None);

        assert_eq!(revision_from_claim_key(dir, "releases/app/dev/main/revisions/7"), Some(7));
        assert_eq!(revision_from_claim_key(dir, "releases/app/dev/main/7.json"), None);
    }
}
