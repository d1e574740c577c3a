use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::storage::template::StorageBackend;
use crate::storage::{object_basename, BackendKind};

pub struct FileSystemBackend {
    directory: PathBuf,
}

impl FileSystemBackend {
    /// Creates the backend rooted at `dir`, creating the directory if needed.
    pub async fn create(dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::from_io(&dir.to_string_lossy(), e))?;

        let directory = tokio::fs::canonicalize(&dir)
            .await
            .map_err(|e| Error::from_io(&dir.to_string_lossy(), e))?;

        info!("Using local filesystem storage @ {:?}", &directory);
        Ok(Self { directory })
    }

    #[inline]
    fn format_path(&self, name: &str) -> Result<(PathBuf, String)> {
        let base = object_basename(name)?;
        Ok((self.directory.join(base), base.to_string()))
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn upload(&self, name: &str, data: Bytes) -> Result<String> {
        let (path, stored_name) = self.format_path(name)?;

        debug!("Storing object @ {:?}", &path);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| Error::from_io(&stored_name, e))?;

        Ok(stored_name)
    }

    async fn download(&self, name: &str) -> Result<Bytes> {
        let (path, stored_name) = self.format_path(name)?;

        debug!("Retrieving object @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => Err(Error::from_io(&stored_name, e)),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let (path, stored_name) = self.format_path(name)?;

        debug!("Purging object @ {:?}", &path);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::from_io(&stored_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    async fn backend() -> anyhow::Result<(tempfile::TempDir, FileSystemBackend)> {
        let dir = tempfile::tempdir()?;
        let backend = FileSystemBackend::create(dir.path().join("store")).await?;
        Ok((dir, backend))
    }

    #[tokio::test]
    async fn upload_then_download_returns_same_bytes() -> anyhow::Result<()> {
        let (_dir, backend) = backend().await?;
        let data = Bytes::from(vec![7u8; 200]);

        let stored = backend.upload("cat.png", data.clone()).await?;
        assert_eq!(stored, "cat.png");
        assert_eq!(backend.download(&stored).await?, data);
        Ok(())
    }

    #[tokio::test]
    async fn traversal_names_only_touch_the_basename() -> anyhow::Result<()> {
        let (dir, backend) = backend().await?;

        let stored = backend
            .upload("../../outside.png", Bytes::from_static(b"abc"))
            .await?;
        assert_eq!(stored, "outside.png");
        assert!(dir.path().join("store").join("outside.png").is_file());
        assert!(!dir.path().join("outside.png").exists());

        let data = backend.download("/some/other/dir/outside.png").await?;
        assert_eq!(data.as_ref(), b"abc");

        backend.delete("nested\\..\\outside.png").await?;
        let err = backend.download("outside.png").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn upload_overwrites_existing_objects() -> anyhow::Result<()> {
        let (_dir, backend) = backend().await?;

        backend.upload("dog.png", Bytes::from_static(b"first")).await?;
        backend.upload("dog.png", Bytes::from_static(b"second")).await?;
        assert_eq!(backend.download("dog.png").await?.as_ref(), b"second");
        Ok(())
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() -> anyhow::Result<()> {
        let (_dir, backend) = backend().await?;

        let err = backend.download("ghost.png").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = backend.delete("ghost.png").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn delete_then_download_is_not_found() -> anyhow::Result<()> {
        let (_dir, backend) = backend().await?;

        backend.upload("bird.gif", Bytes::from_static(b"gif")).await?;
        backend.delete("bird.gif").await?;

        let err = backend.download("bird.gif").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn unusable_names_are_rejected() -> anyhow::Result<()> {
        let (_dir, backend) = backend().await?;

        let err = backend.upload("..", Bytes::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        Ok(())
    }
}
