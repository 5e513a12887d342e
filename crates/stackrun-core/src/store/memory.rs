//! In-process object store for tests

use super::{BlobStore, ObjectLocation, RemoteDigest, DIGEST_METADATA_KEY};
use crate::error::SyncError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub etag: String,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    puts: AtomicUsize,
    fail_heads: AtomicBool,
    fail_puts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through `put_object`
    pub fn insert(&self, location: &ObjectLocation, object: StoredObject) {
        self.objects
            .lock()
            .unwrap()
            .insert((location.bucket.clone(), location.key.clone()), object);
    }

    pub fn get(&self, location: &ObjectLocation) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(location.bucket.clone(), location.key.clone()))
            .cloned()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fail_heads(&self, enabled: bool) {
        self.fail_heads.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, enabled: bool) {
        self.fail_puts.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn head_digest(&self, location: &ObjectLocation) -> RemoteDigest {
        if self.fail_heads.load(Ordering::SeqCst) {
            return RemoteDigest::QueryFailed("injected head failure".into());
        }
        match self.get(location) {
            Some(object) => RemoteDigest::from_attributes(
                object.metadata.get(DIGEST_METADATA_KEY).map(String::as_str),
                Some(object.etag.as_str()),
            ),
            None => RemoteDigest::NotFound,
        }
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: &Path,
        metadata: &[(&str, &str)],
    ) -> Result<(), SyncError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(SyncError::UploadError {
                uri: location.to_string(),
                cause: "injected put failure".into(),
            });
        }
        let data = std::fs::read(body).map_err(|source| SyncError::Io {
            path: body.to_path_buf(),
            source,
        })?;
        let object = StoredObject {
            etag: format!("\"etag-{}\"", data.len()),
            body: data,
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.insert(location, object);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), SyncError> {
        let object = self.get(location).ok_or_else(|| SyncError::DownloadError {
            uri: location.to_string(),
            cause: "no such key".into(),
        })?;
        std::fs::write(dest, &object.body).map_err(|source| SyncError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }
}
