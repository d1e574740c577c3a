use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

use crate::error::{Error, Result};
use crate::storage::template::StorageBackend;
use crate::storage::{validate_key, BackendKind};

/// An S3 compatible object store.
///
/// Object names are used verbatim as keys, there is no hierarchy to escape.
pub struct BlobStorageBackend {
    bucket: Bucket,
}

impl BlobStorageBackend {
    pub fn new(
        name: String,
        region: String,
        endpoint: String,
        access_key: &str,
        secret_key: &str,
        path_style: bool,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let creds = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| Error::Validation(format!("invalid s3 credentials: {}", e)))?;
        let region = Region::Custom { region, endpoint };

        let bucket = Bucket::new(&name, region, creds)
            .map_err(|e| Error::Validation(format!("invalid s3 bucket config: {}", e)))?;

        let mut bucket = if path_style {
            bucket.with_path_style()
        } else {
            bucket
        };
        bucket.set_request_timeout(request_timeout);

        info!("Using s3 storage bucket {:?}", &name);
        Ok(Self { bucket })
    }
}

#[inline]
fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

fn transport_error(name: &str, e: S3Error) -> Error {
    Error::Unavailable(format!("{}: {}", name, e))
}

#[async_trait]
impl StorageBackend for BlobStorageBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    async fn upload(&self, name: &str, data: Bytes) -> Result<String> {
        validate_key(name)?;

        debug!("Storing object in bucket @ {}", name);
        let response = self
            .bucket
            .put_object(name, data.as_ref())
            .await
            .map_err(|e| transport_error(name, e))?;

        let code = response.status_code();
        if is_success(code) {
            Ok(name.to_string())
        } else {
            Err(Error::from_status(name, code))
        }
    }

    async fn download(&self, name: &str) -> Result<Bytes> {
        validate_key(name)?;

        debug!("Retrieving object in bucket @ {}", name);
        let response = self
            .bucket
            .get_object(name)
            .await
            .map_err(|e| transport_error(name, e))?;

        let code = response.status_code();
        if is_success(code) {
            Ok(Bytes::copy_from_slice(response.bytes()))
        } else {
            Err(Error::from_status(name, code))
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_key(name)?;

        // S3 answers deletes of absent keys with success, check first.
        let (_, code) = self
            .bucket
            .head_object(name)
            .await
            .map_err(|e| transport_error(name, e))?;
        if !is_success(code) {
            return Err(Error::from_status(name, code));
        }

        debug!("Purging object in bucket @ {}", name);
        let response = self
            .bucket
            .delete_object(name)
            .await
            .map_err(|e| transport_error(name, e))?;

        let code = response.status_code();
        if is_success(code) {
            Ok(())
        } else {
            Err(Error::from_status(name, code))
        }
    }
}
