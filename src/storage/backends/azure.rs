use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use crate::error::{Error, Result};
use crate::storage::template::StorageBackend;
use crate::storage::{validate_key, BackendKind};

/// An Azure Blob Storage container.
///
/// Like the S3 backend, object names are used verbatim as blob names.
pub struct AzureBlobBackend {
    store: Arc<dyn ObjectStore>,
}

impl AzureBlobBackend {
    pub fn new(
        url: &str,
        account: Option<String>,
        container: String,
        shared_key: String,
    ) -> Result<Self> {
        let account = match account {
            Some(account) => account,
            None => account_from_url(url)?,
        };

        let store = MicrosoftAzureBuilder::new()
            .with_account(account)
            .with_container_name(&container)
            .with_access_key(shared_key)
            .with_endpoint(url.trim_end_matches('/').to_string())
            .with_allow_http(url.starts_with("http://"))
            .build()
            .map_err(|e| Error::Validation(format!("invalid azure config: {}", e)))?;

        info!("Using azure blob container {:?}", &container);
        Ok(Self::from_store(Arc::new(store)))
    }

    /// Wraps an already constructed store.
    pub fn from_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

/// `https://myaccount.blob.core.windows.net` -> `myaccount`
fn account_from_url(url: &str) -> Result<String> {
    let host = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split(|c| c == '/' || c == ':')
        .next()
        .unwrap_or_default();

    match host.split('.').next() {
        Some(account) if !account.is_empty() => Ok(account.to_string()),
        _ => Err(Error::Validation(format!(
            "can not derive the azure account name from {:?}, set azure.account",
            url,
        ))),
    }
}

/// Maps an object name onto a blob path without altering it.
///
/// object_store normalises leading, trailing and doubled slashes away, so
/// such names would alias another blob. They are refused instead.
fn blob_path(name: &str) -> Result<Path> {
    validate_key(name)?;

    match Path::parse(name) {
        Ok(path) if AsRef::<str>::as_ref(&path) == name => Ok(path),
        _ => Err(Error::Validation(format!("{:?} is not a usable blob name", name))),
    }
}

fn map_store_error(name: &str, e: object_store::Error) -> Error {
    match e {
        object_store::Error::NotFound { .. } => Error::NotFound(name.to_string()),
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => {
            Error::AccessDenied(format!("{}: {}", name, e))
        },
        other => Error::Unavailable(format!("{}: {}", name, other)),
    }
}

#[async_trait]
impl StorageBackend for AzureBlobBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Azure
    }

    async fn upload(&self, name: &str, data: Bytes) -> Result<String> {
        let path = blob_path(name)?;

        debug!("Storing blob @ {}", name);
        self.store
            .put(&path, PutPayload::from(data))
            .await
            .map_err(|e| map_store_error(name, e))?;

        Ok(name.to_string())
    }

    async fn download(&self, name: &str) -> Result<Bytes> {
        let path = blob_path(name)?;

        debug!("Retrieving blob @ {}", name);
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| map_store_error(name, e))?;

        result.bytes().await.map_err(|e| map_store_error(name, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = blob_path(name)?;

        self.store
            .head(&path)
            .await
            .map_err(|e| map_store_error(name, e))?;

        debug!("Purging blob @ {}", name);
        self.store
            .delete(&path)
            .await
            .map_err(|e| map_store_error(name, e))
    }
}
