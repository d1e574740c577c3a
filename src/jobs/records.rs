use std::fmt;

use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::StoredObject;

/// An already verified caller identity.
///
/// Only ever compared for equality.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

/// A processing job as persisted by the surrounding service.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJobRecord {
    pub job_id: Uuid,

    /// A caller supplied label for the job.
    pub job_name: String,

    pub owner: OwnerId,

    pub source_object: StoredObject,

    /// Set once the worker delivered the result image.
    pub destination_object: Option<StoredObject>,

    /// The last status string reported by the worker, if any.
    pub status: Option<String>,

    /// The serialized envelope that was dispatched, kept for audit and replay.
    pub envelope_payload: String,
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum JobState {
    Submitted,
    Reported(String),
    Finalized(StoredObject),
}

impl ProcessingJobRecord {
    pub fn state(&self) -> JobState {
        match (&self.destination_object, &self.status) {
            (Some(destination), _) => JobState::Finalized(destination.clone()),
            (None, Some(status)) => JobState::Reported(status.clone()),
            (None, None) => JobState::Submitted,
        }
    }
}

/// Durable storage of job records, provided by the surrounding service.
///
/// A write must be durable once the returned future resolves. Callbacks
/// for the same job can race, so each mutation touches a single field and
/// is applied atomically by the store, never as a read-modify-write of the
/// whole record.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn insert(&self, record: ProcessingJobRecord) -> Result<()>;

    async fn get(&self, job_id: Uuid) -> Result<Option<ProcessingJobRecord>>;

    /// Overwrites the status of a job and returns the updated record.
    ///
    /// Fails with `NotFound` if there is no such job.
    async fn set_status(&self, job_id: Uuid, status: &str) -> Result<ProcessingJobRecord>;

    /// Sets the destination of a job unless one is already set.
    ///
    /// The check and the write are a single atomic step. Fails with
    /// `AlreadyFinalized` if a destination exists and `NotFound` if there
    /// is no such job.
    async fn set_destination_if_absent(
        &self,
        job_id: Uuid,
        destination: StoredObject,
    ) -> Result<ProcessingJobRecord>;

    async fn list_for_source(
        &self,
        owner: &OwnerId,
        source_name: &str,
    ) -> Result<Vec<ProcessingJobRecord>>;
}

/// Keeps records in memory, for tests and one-shot CLI use.
#[derive(Default)]
pub struct MemoryJobStore {
    records: RwLock<HashMap<Uuid, ProcessingJobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, record: ProcessingJobRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.job_id) {
            return Err(Error::JobStore(format!("job {} already exists", record.job_id)));
        }

        records.insert(record.job_id, record);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ProcessingJobRecord>> {
        Ok(self.records.read().await.get(&job_id).cloned())
    }

    async fn set_status(&self, job_id: Uuid, status: &str) -> Result<ProcessingJobRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        record.status = Some(status.to_string());
        Ok(record.clone())
    }

    async fn set_destination_if_absent(
        &self,
        job_id: Uuid,
        destination: StoredObject,
    ) -> Result<ProcessingJobRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        if record.destination_object.is_some() {
            return Err(Error::AlreadyFinalized(job_id));
        }

        record.destination_object = Some(destination);
        Ok(record.clone())
    }

    async fn list_for_source(
        &self,
        owner: &OwnerId,
        source_name: &str,
    ) -> Result<Vec<ProcessingJobRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| &r.owner == owner && r.source_object.name == source_name)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::BackendKind;

    fn record(owner: &str, source: &str) -> ProcessingJobRecord {
        ProcessingJobRecord {
            job_id: Uuid::new_v4(),
            job_name: "thumbnail".to_string(),
            owner: OwnerId::from(owner),
            source_object: StoredObject::new(source, BackendKind::Local),
            destination_object: None,
            status: None,
            envelope_payload: "{}".to_string(),
        }
    }

    #[test]
    fn state_is_derived_from_status_and_destination() {
        let mut job = record("alice", "cat.png");
        assert_eq!(job.state(), JobState::Submitted);

        job.status = Some("processing".to_string());
        assert_eq!(job.state(), JobState::Reported("processing".to_string()));

        let destination = StoredObject::new("cat_small.png", BackendKind::Local);
        job.destination_object = Some(destination.clone());
        assert_eq!(job.state(), JobState::Finalized(destination));
    }

    #[tokio::test]
    async fn insert_get_set_status() -> anyhow::Result<()> {
        let store = MemoryJobStore::new();
        let mut job = record("alice", "cat.png");

        store.insert(job.clone()).await?;
        assert!(store.insert(job.clone()).await.is_err());

        let updated = store.set_status(job.job_id, "done").await?;
        job.status = Some("done".to_string());
        assert_eq!(updated, job);
        assert_eq!(store.get(job.job_id).await?, Some(job));
        Ok(())
    }

    #[tokio::test]
    async fn destination_is_only_set_once() -> anyhow::Result<()> {
        let store = MemoryJobStore::new();
        let job = record("alice", "cat.png");
        store.insert(job.clone()).await?;

        let first = StoredObject::new("first.png", BackendKind::Local);
        let second = StoredObject::new("second.png", BackendKind::Local);

        store.set_destination_if_absent(job.job_id, first.clone()).await?;
        let err = store
            .set_destination_if_absent(job.job_id, second)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyFinalized);

        // Later status reports leave the destination alone.
        let updated = store.set_status(job.job_id, "late").await?;
        assert_eq!(updated.state(), JobState::Finalized(first));
        Ok(())
    }

    #[tokio::test]
    async fn writes_to_unknown_jobs_are_not_found() {
        let store = MemoryJobStore::new();
        let ghost = Uuid::new_v4();

        let err = store.set_status(ghost, "processing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let destination = StoredObject::new("out.png", BackendKind::Local);
        let err = store
            .set_destination_if_absent(ghost, destination)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn listing_is_scoped_by_owner_and_source() -> anyhow::Result<()> {
        let store = MemoryJobStore::new();
        store.insert(record("alice", "cat.png")).await?;
        store.insert(record("alice", "cat.png")).await?;
        store.insert(record("alice", "dog.png")).await?;
        store.insert(record("bob", "cat.png")).await?;

        let jobs = store.list_for_source(&OwnerId::from("alice"), "cat.png").await?;
        assert_eq!(jobs.len(), 2);
        Ok(())
    }
}
