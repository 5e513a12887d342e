//! Content-addressed sync
//!
//! Upload a local file only when its SHA-256 differs from the digest
//! recorded on the remote object. The digest is stored as object metadata
//! on every upload, so the decision never depends on how the store computes
//! its own ETag (multipart uploads produce composite ETags).

use crate::config::Config;
use crate::digest::compute_digest;
use crate::error::{SyncError, TaskError};
use crate::stack::{tfvars_file_name, EnvironmentContext};
use crate::store::{BlobStore, ObjectLocation, RemoteDigest, DIGEST_METADATA_KEY};
use std::fmt;
use std::path::{Path, PathBuf};

/// What happened to one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub file_name: String,
    pub digest: String,
    pub uploaded: bool,
}

/// Per-file status lines for `upload_artifacts`
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncSummary {
    pub fn uploaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.uploaded).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.uploaded()
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        for outcome in &self.outcomes {
            let status = if outcome.uploaded { "uploaded" } else { "skipped" };
            writeln!(f, " - {}: {}", outcome.file_name, status)?;
        }
        Ok(())
    }
}

/// Sync driver over any blob store backend
pub struct Syncer<S> {
    store: S,
}

impl<S: BlobStore> Syncer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Digest recorded for `bucket/key`, or why it could not be confirmed
    pub async fn fetch_remote_digest(&self, bucket: &str, key: &str) -> RemoteDigest {
        self.store
            .head_digest(&ObjectLocation::new(bucket, key))
            .await
    }

    /// Upload `local_path` to `remote_uri` unless the remote digest matches.
    /// Returns whether an upload happened.
    pub async fn sync_if_changed(
        &self,
        local_path: &Path,
        remote_uri: &str,
    ) -> Result<bool, SyncError> {
        let location = ObjectLocation::parse(remote_uri)?;
        let (uploaded, _) = self.sync_location(local_path, &location).await?;
        Ok(uploaded)
    }

    async fn sync_location(
        &self,
        local_path: &Path,
        location: &ObjectLocation,
    ) -> Result<(bool, String), SyncError> {
        tracing::info!("🧩 Checking {} against {}", local_path.display(), location);

        let local = compute_digest(local_path).map_err(|source| SyncError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;

        let must_upload = match self.fetch_remote_digest(&location.bucket, &location.key).await {
            RemoteDigest::Found(remote) => remote != local,
            RemoteDigest::NotFound => true,
            // Identity cannot be confirmed, so re-upload rather than skip.
            RemoteDigest::QueryFailed(cause) => {
                tracing::warn!("Remote digest lookup for {} failed: {}", location, cause);
                true
            }
        };

        if !must_upload {
            tracing::info!("✅ No change detected (SHA256: {}). Skipping upload.", local);
            return Ok((false, local));
        }

        tracing::info!("⬆️ Uploading new version (SHA256: {})...", local);
        self.store
            .put_object(location, local_path, &[(DIGEST_METADATA_KEY, local.as_str())])
            .await?;
        tracing::info!("✅ Uploaded {} to {}", local_path.display(), location);
        Ok((true, local))
    }

    /// Pull the environment's variable file to its local path
    pub async fn sync_tfvars(&self, config: &Config, env: &str) -> Result<PathBuf, TaskError> {
        let ctx = EnvironmentContext::new(config, env)?;
        let remote = format!(
            "{}/{}",
            config.tfvars_remote.trim_end_matches('/'),
            tfvars_file_name(config, env)
        );
        let location = ObjectLocation::parse(&remote)?;

        if let Some(parent) = ctx.tfvars.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.store.download(&location, &ctx.tfvars).await?;

        tracing::info!("✅ Synced tfvars: {} → {}", location, ctx.tfvars.display());
        Ok(ctx.tfvars)
    }

    /// Upload every artifact in the deploy dir whose content changed.
    /// The first upload failure stops the run.
    pub async fn upload_artifacts(
        &self,
        config: &Config,
        env: &str,
    ) -> Result<SyncSummary, TaskError> {
        let ctx = EnvironmentContext::new(config, env)?;
        let mut summary = SyncSummary::default();

        for path in artifact_files(config)? {
            let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let location = ObjectLocation::new(
                config.deploy_bucket.as_str(),
                format!("{}/deployments/{}", ctx.name, file_name),
            );
            let (uploaded, digest) = self.sync_location(&path, &location).await?;
            summary.outcomes.push(SyncOutcome {
                file_name,
                digest,
                uploaded,
            });
        }

        Ok(summary)
    }
}

/// Files in the deploy dir matching the artifact pattern, sorted by path
pub fn artifact_files(config: &Config) -> Result<Vec<PathBuf>, TaskError> {
    let dir = config.resolve(&config.deploy_dir);
    if !dir.is_dir() {
        return Err(TaskError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("deploy directory not found: {}", dir.display()),
        )));
    }

    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        config.artifact_pattern
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| TaskError::InvalidArgument(format!("bad artifact pattern: {}", e)))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}
