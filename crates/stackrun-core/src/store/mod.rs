//! Object store access
//!
//! Backends:
//! - `AwsCliStore` shells out to `aws s3api` / `aws s3 cp`
//! - `S3Store` signs requests for an S3-compatible endpoint (S3/R2/MinIO)
//!
//! Both record the content digest as object metadata under `sha256`.

pub mod aws_cli;
#[cfg(test)]
pub mod memory;
pub mod s3;

use crate::config::StoreConfig;
use crate::error::SyncError;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

pub use aws_cli::AwsCliStore;
#[cfg(test)]
pub use memory::MemoryStore;
pub use s3::S3Store;

/// Metadata key carrying the hex SHA-256 of the uploaded bytes
pub const DIGEST_METADATA_KEY: &str = "sha256";

const S3_SCHEME: &str = "s3://";

/// A `bucket/key` pair parsed from an `s3://` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `s3://bucket/key`
    pub fn parse(uri: &str) -> Result<Self, SyncError> {
        let rest = uri
            .strip_prefix(S3_SCHEME)
            .ok_or_else(|| SyncError::InvalidArgument(format!("invalid S3 URI: {}", uri)))?;

        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(bucket, key))
            }
            _ => Err(SyncError::InvalidArgument(format!(
                "S3 URI needs both bucket and key: {}",
                uri
            ))),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", S3_SCHEME, self.bucket, self.key)
    }
}

/// Result of looking up the digest recorded for a remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDigest {
    Found(String),
    NotFound,
    QueryFailed(String),
}

impl RemoteDigest {
    /// Prefer the recorded `sha256` metadata, else the ETag without quotes
    pub fn from_attributes(sha256: Option<&str>, etag: Option<&str>) -> Self {
        if let Some(digest) = sha256.filter(|d| !d.is_empty()) {
            return RemoteDigest::Found(digest.to_string());
        }
        match etag.map(|e| e.replace('"', "")) {
            Some(etag) if !etag.is_empty() => RemoteDigest::Found(etag),
            _ => RemoteDigest::QueryFailed("object has neither sha256 metadata nor ETag".into()),
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend name for log lines
    fn name(&self) -> &'static str;

    /// Look up the digest recorded for `location`
    async fn head_digest(&self, location: &ObjectLocation) -> RemoteDigest;

    /// Upload the whole file at `body`, attaching `metadata` to the object
    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: &Path,
        metadata: &[(&str, &str)],
    ) -> Result<(), SyncError>;

    /// Copy the object at `location` to the local path `dest`
    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), SyncError>;
}

#[async_trait]
impl BlobStore for Box<dyn BlobStore> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn head_digest(&self, location: &ObjectLocation) -> RemoteDigest {
        (**self).head_digest(location).await
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: &Path,
        metadata: &[(&str, &str)],
    ) -> Result<(), SyncError> {
        (**self).put_object(location, body, metadata).await
    }

    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), SyncError> {
        (**self).download(location, dest).await
    }
}

/// Build the backend selected in the config
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn BlobStore>, SyncError> {
    let store: Box<dyn BlobStore> = match config {
        StoreConfig::AwsCli { bin } => Box::new(AwsCliStore::new(bin.clone())),
        StoreConfig::S3(s3) => Box::new(S3Store::from_config(s3)?),
    };
    tracing::debug!("Using {} object store", store.name());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let loc = ObjectLocation::parse("s3://my-bucket/dev1/deployments/app.zip").unwrap();
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.key, "dev1/deployments/app.zip");
        assert_eq!(loc.to_string(), "s3://my-bucket/dev1/deployments/app.zip");
    }

    #[test]
    fn test_parse_rejects_bare_path() {
        for uri in ["/tmp/app.zip", "my-bucket/app.zip", "https://x/y", "S3://b/k"] {
            assert!(
                matches!(ObjectLocation::parse(uri), Err(SyncError::InvalidArgument(_))),
                "{} should be rejected",
                uri
            );
        }
    }

    #[test]
    fn test_parse_rejects_missing_key() {
        assert!(ObjectLocation::parse("s3://bucket").is_err());
        assert!(ObjectLocation::parse("s3://bucket/").is_err());
        assert!(ObjectLocation::parse("s3:///key").is_err());
    }

    #[test]
    fn test_metadata_preferred_over_etag() {
        let digest = RemoteDigest::from_attributes(Some("abc"), Some("\"etag\""));
        assert_eq!(digest, RemoteDigest::Found("abc".into()));
    }

    #[test]
    fn test_etag_fallback_strips_quotes() {
        let etag = "\"9b2cf535f27731c974343645a3985328\"";
        let digest = RemoteDigest::from_attributes(None, Some(etag));
        assert_eq!(
            digest,
            RemoteDigest::Found("9b2cf535f27731c974343645a3985328".into())
        );
    }

    #[test]
    fn test_no_attributes_is_query_failure() {
        assert!(matches!(
            RemoteDigest::from_attributes(None, None),
            RemoteDigest::QueryFailed(_)
        ));
    }
}
