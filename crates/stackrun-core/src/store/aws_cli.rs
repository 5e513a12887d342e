//! Object store backed by the `aws` CLI

use super::{BlobStore, ObjectLocation, RemoteDigest, DIGEST_METADATA_KEY};
use crate::error::SyncError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;

/// `aws s3api head-object` response (fields we read)
#[derive(Debug, Deserialize)]
struct HeadObjectOutput {
    #[serde(rename = "Metadata", default)]
    metadata: HashMap<String, String>,
    #[serde(rename = "ETag")]
    etag: Option<String>,
}

/// Drives `aws s3api` / `aws s3 cp` as child processes
pub struct AwsCliStore {
    bin: String,
}

impl AwsCliStore {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn output(&self, args: &[&str]) -> std::io::Result<Output> {
        tracing::debug!("→ {} {}", self.bin, args.join(" "));
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }
}

/// Turn a head-object result into a remote digest
fn parse_head_output(output: &Output) -> RemoteDigest {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Not Found") || stderr.contains("404") || stderr.contains("NoSuchKey") {
            return RemoteDigest::NotFound;
        }
        return RemoteDigest::QueryFailed(failure_cause(output));
    }

    match serde_json::from_slice::<HeadObjectOutput>(&output.stdout) {
        Ok(head) => RemoteDigest::from_attributes(
            head.metadata.get(DIGEST_METADATA_KEY).map(String::as_str),
            head.etag.as_deref(),
        ),
        Err(e) => RemoteDigest::QueryFailed(format!("unreadable head-object output: {}", e)),
    }
}

fn failure_cause(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("aws exited with {}", output.status)
    } else {
        stderr
    }
}

#[async_trait]
impl BlobStore for AwsCliStore {
    fn name(&self) -> &'static str {
        "aws-cli"
    }

    async fn head_digest(&self, location: &ObjectLocation) -> RemoteDigest {
        let args = [
            "s3api",
            "head-object",
            "--bucket",
            location.bucket.as_str(),
            "--key",
            location.key.as_str(),
        ];
        match self.output(&args).await {
            Ok(output) => parse_head_output(&output),
            Err(e) => RemoteDigest::QueryFailed(format!("cannot run {}: {}", self.bin, e)),
        }
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: &Path,
        metadata: &[(&str, &str)],
    ) -> Result<(), SyncError> {
        let body = body.to_string_lossy();
        let metadata = metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        let mut args = vec![
            "s3api",
            "put-object",
            "--bucket",
            location.bucket.as_str(),
            "--key",
            location.key.as_str(),
            "--body",
            &*body,
        ];
        if !metadata.is_empty() {
            args.extend(["--metadata", metadata.as_str()]);
        }

        let output = self.output(&args).await.map_err(|e| SyncError::UploadError {
            uri: location.to_string(),
            cause: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(SyncError::UploadError {
                uri: location.to_string(),
                cause: failure_cause(&output),
            });
        }
        Ok(())
    }

    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), SyncError> {
        let uri = location.to_string();
        let dest_arg = dest.to_string_lossy();
        tracing::info!("→ {} s3 cp {} {}", self.bin, uri, dest_arg);

        let status = Command::new(&self.bin)
            .args(["s3", "cp", uri.as_str(), &*dest_arg])
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| SyncError::DownloadError {
                uri: uri.clone(),
                cause: e.to_string(),
            })?;

        if !status.success() {
            return Err(SyncError::DownloadError {
                uri,
                cause: format!("aws exited with {}", status),
            });
        }
        Ok(())
    }
}
