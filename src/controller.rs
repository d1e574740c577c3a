use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;
use crate::storage::template::StorageBackend;
use crate::storage::{BackendKind, StoredObject};

#[derive(Debug, Clone, Serialize)]
pub struct UploadInfo {
    /// Where the object ended up.
    ///
    /// The stored name can differ from the requested one, callers must
    /// keep this rather than the name they uploaded with.
    pub object: StoredObject,

    /// The crc32 checksum of the uploaded bytes.
    pub checksum: u32,

    /// The number of bytes stored.
    pub size: usize,

    /// The time spent in the storage backend in seconds.
    pub transfer_time: f32,
}

/// The object operations exposed to the surrounding service.
#[derive(Clone)]
pub struct ObjectController {
    storage: Arc<dyn StorageBackend>,
}

impl ObjectController {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    #[inline]
    pub fn backend(&self) -> BackendKind {
        self.storage.kind()
    }

    #[inline]
    pub fn storage(&self) -> Arc<dyn StorageBackend> {
        self.storage.clone()
    }

    pub async fn upload(&self, name: &str, data: Bytes) -> Result<UploadInfo> {
        let checksum = crate::utils::checksum(&data);
        let size = data.len();

        let instant = Instant::now();
        let stored_name = self.storage.upload(name, data).await?;
        let transfer_time = instant.elapsed().as_secs_f32();

        debug!("Uploaded {} bytes as {} in {:.3}s", size, &stored_name, transfer_time);
        Ok(UploadInfo {
            object: StoredObject::new(stored_name, self.storage.kind()),
            checksum,
            size,
            transfer_time,
        })
    }

    pub async fn download(&self, name: &str) -> Result<Bytes> {
        self.storage.download(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.storage.delete(name).await
    }
}
