//! S3-compatible object store over presigned HTTP requests
//!
//! Works against AWS S3, R2 and MinIO. Metadata travels as
//! `x-amz-meta-<key>` headers, which are part of the signature.

use super::{BlobStore, ObjectLocation, RemoteDigest, DIGEST_METADATA_KEY};
use crate::config::S3Config;
use crate::error::SyncError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};
use std::path::Path;
use std::time::Duration;

const SIGN_DURATION: Duration = Duration::from_secs(300);
const META_PREFIX: &str = "x-amz-meta-";

/// S3/R2 client
pub struct S3Store {
    endpoint: Url,
    region: String,
    credentials: Credentials,
    client: reqwest::Client,
}

impl S3Store {
    /// Create new store from config
    pub fn from_config(config: &S3Config) -> Result<Self, SyncError> {
        let endpoint = config.endpoint.parse().map_err(|_| {
            SyncError::InvalidArgument(format!("invalid endpoint URL: {}", config.endpoint))
        })?;

        let credentials = Credentials::new(config.access_key.clone(), config.secret_key.clone());

        Ok(Self {
            endpoint,
            region: config.region.clone(),
            credentials,
            client: reqwest::Client::new(),
        })
    }

    fn bucket(&self, name: &str) -> Result<Bucket, SyncError> {
        Bucket::new(
            self.endpoint.clone(),
            UrlStyle::Path,
            name.to_string(),
            self.region.clone(),
        )
        .map_err(|e| SyncError::InvalidArgument(format!("invalid bucket '{}': {}", name, e)))
    }
}

#[async_trait]
impl BlobStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn head_digest(&self, location: &ObjectLocation) -> RemoteDigest {
        let bucket = match self.bucket(&location.bucket) {
            Ok(bucket) => bucket,
            Err(e) => return RemoteDigest::QueryFailed(e.to_string()),
        };
        let url = bucket
            .head_object(Some(&self.credentials), &location.key)
            .sign(SIGN_DURATION);

        let resp = match self.client.head(url).send().await {
            Ok(resp) => resp,
            Err(e) => return RemoteDigest::QueryFailed(e.to_string()),
        };

        match resp.status() {
            StatusCode::NOT_FOUND => RemoteDigest::NotFound,
            status if status.is_success() => {
                let headers = resp.headers();
                let sha256 = headers
                    .get(format!("{}{}", META_PREFIX, DIGEST_METADATA_KEY))
                    .and_then(|v| v.to_str().ok());
                let etag = headers.get("etag").and_then(|v| v.to_str().ok());
                RemoteDigest::from_attributes(sha256, etag)
            }
            status => RemoteDigest::QueryFailed(format!("HEAD returned {}", status)),
        }
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: &Path,
        metadata: &[(&str, &str)],
    ) -> Result<(), SyncError> {
        let upload_error = |cause: String| SyncError::UploadError {
            uri: location.to_string(),
            cause,
        };

        let bucket = self.bucket(&location.bucket)?;
        let data = tokio::fs::read(body).await.map_err(|source| SyncError::Io {
            path: body.to_path_buf(),
            source,
        })?;

        let headers: Vec<(String, String)> = metadata
            .iter()
            .map(|(k, v)| (format!("{}{}", META_PREFIX, k), v.to_string()))
            .collect();

        let mut action = bucket.put_object(Some(&self.credentials), &location.key);
        for (name, value) in &headers {
            action.headers_mut().insert(name.clone(), value.clone());
        }
        let url = action.sign(SIGN_DURATION);

        let mut request = self.client.put(url).body(data);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(upload_error(format!("PUT returned {}", resp.status())));
        }

        tracing::debug!("☁️ Uploaded: {}", location);
        Ok(())
    }

    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), SyncError> {
        let download_error = |cause: String| SyncError::DownloadError {
            uri: location.to_string(),
            cause,
        };

        let bucket = self.bucket(&location.bucket)?;
        let url = bucket
            .get_object(Some(&self.credentials), &location.key)
            .sign(SIGN_DURATION);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(download_error(format!("GET returned {}", resp.status())));
        }

        let data = resp
            .bytes()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        tokio::fs::write(dest, &data)
            .await
            .map_err(|source| SyncError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

        tracing::debug!("☁️ Downloaded: {}", location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn local_store(endpoint: &str) -> S3Store {
        let mut store = S3Store::from_config(&config(endpoint)).unwrap();
        store.client = reqwest::Client::builder().no_proxy().build().unwrap();
        store
    }

    /// Accept one HTTP request, answer with `response`, return the raw request
    async fn serve_once(response: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length || n == 0 {
                        break;
                    }
                } else if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (endpoint, handle)
    }

    fn config(endpoint: &str) -> S3Config {
        S3Config {
            endpoint: endpoint.into(),
            region: "us-east-1".into(),
            access_key: "test-key".into(),
            secret_key: "test-secret".into(),
        }
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let err = S3Store::from_config(&config("not a url")).err().unwrap();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    #[test]
    fn test_presigned_head_url_targets_key() {
        let store = S3Store::from_config(&config("https://s3.example.com")).unwrap();
        let bucket = store.bucket("artifacts").unwrap();
        let url = bucket
            .head_object(Some(&store.credentials), "dev1/deployments/app.zip")
            .sign(SIGN_DURATION);
        assert_eq!(url.host_str(), Some("s3.example.com"));
        assert_eq!(url.path(), "/artifacts/dev1/deployments/app.zip");
        assert!(url.query().unwrap_or_default().contains("X-Amz-Signature"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_query_failure() {
        let store = S3Store::from_config(&config("http://127.0.0.1:1")).unwrap();
        let digest = store
            .head_digest(&ObjectLocation::new("artifacts", "app.zip"))
            .await;
        assert!(matches!(digest, RemoteDigest::QueryFailed(_)));
    }

    #[tokio::test]
    async fn test_put_sends_signed_digest_header() {
        let (endpoint, server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        let dir = tempfile::tempdir().unwrap();
        let body = dir.path().join("app.zip");
        std::fs::write(&body, b"release-1").unwrap();

        let store = local_store(&endpoint);
        store
            .put_object(
                &ObjectLocation::new("artifacts", "dev1/deployments/app.zip"),
                &body,
                &[(DIGEST_METADATA_KEY, "abc")],
            )
            .await
            .unwrap();

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("PUT /artifacts/dev1/deployments/app.zip?"));
        assert!(request_line.contains("X-Amz-Signature="));
        assert!(request_line.contains("x-amz-meta-sha256"));
        assert!(request
            .lines()
            .any(|line| line.eq_ignore_ascii_case("x-amz-meta-sha256: abc")));
        assert!(request.ends_with("release-1"));
    }

    #[tokio::test]
    async fn test_head_reads_digest_header() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 200 OK\r\nETag: \"etag-9\"\r\nx-amz-meta-sha256: abc\r\nContent-Length: 0\r\n\r\n",
        )
        .await;
        let store = local_store(&endpoint);

        let digest = store
            .head_digest(&ObjectLocation::new("artifacts", "app.zip"))
            .await;

        assert_eq!(digest, RemoteDigest::Found("abc".into()));
        assert!(server.await.unwrap().starts_with("HEAD /artifacts/app.zip?"));
    }

    #[tokio::test]
    async fn test_head_missing_object_is_not_found() {
        let (endpoint, _server) =
            serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;
        let store = local_store(&endpoint);

        let digest = store
            .head_digest(&ObjectLocation::new("artifacts", "app.zip"))
            .await;

        assert_eq!(digest, RemoteDigest::NotFound);
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let (endpoint, server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nx = 1\n").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dev1_v2.tfvars");
        let store = local_store(&endpoint);

        store
            .download(&ObjectLocation::new("tfvars", "env-tfvars/dev1_v2.tfvars"), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "x = 1\n");
        assert!(server
            .await
            .unwrap()
            .starts_with("GET /tfvars/env-tfvars/dev1_v2.tfvars?"));
    }
}
