use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::template::StorageBackend;

/// Selects which backend the process stores objects in.
///
/// Only the section matching `backend` is read, every field it requires
/// is checked when the backend is constructed rather than on first use.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// One of `local`, `s3` or `azure` (case-insensitive).
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LocalConfig {
    /// The directory every object is stored directly under.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct S3Config {
    /// The service endpoint, e.g. `https://s3.eu-west-1.amazonaws.com`.
    pub url: Option<String>,

    /// Defaults to `us-east-1`.
    pub region: Option<String>,

    pub bucket: Option<String>,

    pub access_key: Option<String>,

    pub secret_key: Option<String>,

    #[serde(default = "default_true")]
    /// Address the bucket as part of the path rather than the host name.
    ///
    /// Most self-hosted S3 compatible services require this.
    /// Defaults to `true`.
    pub path_style: bool,

    /// An optional per request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AzureConfig {
    /// The blob service URL, e.g. `https://myaccount.blob.core.windows.net`.
    pub url: Option<String>,

    /// The storage account name.
    ///
    /// Defaults to the first label of the `url` host.
    pub account: Option<String>,

    pub container: Option<String>,

    /// The account's shared access key.
    pub shared_key: Option<String>,
}

impl StorageConfig {
    /// Constructs the one storage backend the process will use.
    pub async fn connect(&self) -> Result<Arc<dyn StorageBackend>> {
        let backend = self.backend.trim().to_lowercase();

        match backend.as_str() {
            "local" => {
                let cfg = self.local.clone().unwrap_or_default();
                let directory = cfg
                    .directory
                    .ok_or_else(|| Error::missing_field("local", "local.directory"))?;

                let backend = super::filesystem::FileSystemBackend::create(directory).await?;
                Ok(Arc::new(backend))
            },
            "s3" => {
                let cfg = self.s3.clone().unwrap_or_default();
                let url = required("s3", "s3.url", cfg.url)?;
                let bucket = required("s3", "s3.bucket", cfg.bucket)?;
                let access_key = required("s3", "s3.access_key", cfg.access_key)?;
                let secret_key = required("s3", "s3.secret_key", cfg.secret_key)?;
                let region = cfg.region.unwrap_or_else(|| "us-east-1".to_string());

                let backend = super::blob_storage::BlobStorageBackend::new(
                    bucket,
                    region,
                    url,
                    &access_key,
                    &secret_key,
                    cfg.path_style,
                    cfg.request_timeout_secs.map(Duration::from_secs),
                )?;
                Ok(Arc::new(backend))
            },
            "azure" => {
                let cfg = self.azure.clone().unwrap_or_default();
                let url = required("azure", "azure.url", cfg.url)?;
                let container = required("azure", "azure.container", cfg.container)?;
                let shared_key = required("azure", "azure.shared_key", cfg.shared_key)?;

                let backend = super::azure::AzureBlobBackend::new(
                    &url,
                    cfg.account,
                    container,
                    shared_key,
                )?;
                Ok(Arc::new(backend))
            },
            other => Err(Error::Validation(format!(
                "invalid storage backend {:?}, expected one of \"local\", \"s3\" or \"azure\"",
                other,
            ))),
        }
    }

    pub fn template(backend: &str) -> Result<Self> {
        let mut cfg = Self {
            backend: backend.to_lowercase(),
            ..Default::default()
        };

        match cfg.backend.as_str() {
            "local" => {
                cfg.local = Some(LocalConfig {
                    directory: Some(PathBuf::from("./data")),
                });
            },
            "s3" => {
                cfg.s3 = Some(S3Config {
                    url: Some("http://127.0.0.1:9000".to_string()),
                    region: Some("us-east-1".to_string()),
                    bucket: Some("images".to_string()),
                    access_key: Some("<access-key>".to_string()),
                    secret_key: Some("<secret-key>".to_string()),
                    path_style: true,
                    request_timeout_secs: Some(30),
                });
            },
            "azure" => {
                cfg.azure = Some(AzureConfig {
                    url: Some("https://<account>.blob.core.windows.net".to_string()),
                    account: None,
                    container: Some("images".to_string()),
                    shared_key: Some("<shared-key>".to_string()),
                });
            },
            other => {
                return Err(Error::Validation(format!(
                    "no template exists for storage backend {:?}",
                    other,
                )))
            },
        }

        Ok(cfg)
    }
}

fn required(backend: &str, field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::missing_field(backend, field)),
    }
}

const fn default_true() -> bool {
    true
}
