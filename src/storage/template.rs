use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::storage::BackendKind;

/// The capability set every storage backend exposes.
///
/// Transfers are full-buffer: `download` returns only once the whole object
/// has been read and `upload` takes the whole object in one go.
/// All failures are reported as `NotFound`, `AccessDenied` or `Unavailable`
/// (plus `Validation` for names the backend can not address).
#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    fn kind(&self) -> BackendKind;

    /// Stores `data` and returns the name it was stored under.
    async fn upload(&self, name: &str, data: Bytes) -> Result<String>;

    async fn download(&self, name: &str) -> Result<Bytes>;

    async fn delete(&self, name: &str) -> Result<()>;
}
