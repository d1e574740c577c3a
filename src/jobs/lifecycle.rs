use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::config::ImageFormat;
use crate::error::{Error, Result};
use crate::jobs::envelope::JobEnvelope;
use crate::jobs::records::{JobStore, OwnerId, ProcessingJobRecord};
use crate::jobs::submitter::JobSubmitter;
use crate::storage::template::StorageBackend;
use crate::storage::StoredObject;

/// A caller's request to transform one of their stored images.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_name: String,

    /// The stored image to transform.
    pub source: StoredObject,

    pub width: u32,

    pub height: u32,

    /// The requested output format, checked against the supported set.
    pub format: String,
}

/// Drives jobs from submission to finalization.
///
/// Worker callbacks can arrive in any order and long after the submitting
/// task has finished, every callback works purely from the stored record.
pub struct JobManager {
    storage: Arc<dyn StorageBackend>,
    submitter: Arc<JobSubmitter>,
    records: Arc<dyn JobStore>,
}

impl JobManager {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        submitter: Arc<JobSubmitter>,
        records: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            storage,
            submitter,
            records,
        }
    }

    /// Dispatches a new job and records it as submitted.
    ///
    /// Nothing is persisted unless the worker accepted the job.
    pub async fn submit_job(&self, owner: OwnerId, request: JobRequest) -> Result<ProcessingJobRecord> {
        let format = ImageFormat::parse(&request.format)?;
        let job_id = Uuid::new_v4();

        let envelope = JobEnvelope::new(
            request.source.name.clone(),
            request.width,
            request.height,
            format,
        )
        .with_job_id(job_id);
        envelope.validate()?;

        let payload = String::from_utf8(envelope.encode()?)
            .map_err(|e| Error::Validation(format!("job envelope is not utf-8: {}", e)))?;

        self.submitter.submit(&envelope).await?;

        let record = ProcessingJobRecord {
            job_id,
            job_name: request.job_name,
            owner,
            source_object: request.source,
            destination_object: None,
            status: None,
            envelope_payload: payload,
        };
        self.records.insert(record.clone()).await?;

        info!(
            "Submitted job {} for {} ({}x{} {})",
            job_id, &record.source_object.name, request.width, request.height, format,
        );
        Ok(record)
    }

    /// Records the worker's latest status for a job, the last report wins.
    pub async fn apply_worker_status(&self, job_id: Uuid, status: &str) -> Result<ProcessingJobRecord> {
        let record = self.records.set_status(job_id, status).await?;

        debug!("Job {} reported status {:?}", job_id, status);
        Ok(record)
    }

    /// Stores the worker's result image and marks the job finalized.
    ///
    /// The record is only touched after the storage backend accepted the
    /// bytes. A job can be finalized once, later attempts are rejected
    /// before anything is written. When two finalizations race, the store
    /// decides the winner and the loser's upload is removed again unless it
    /// landed on the winner's object.
    pub async fn apply_worker_finalize(
        &self,
        job_id: Uuid,
        result_name: &str,
        data: Bytes,
    ) -> Result<StoredObject> {
        let record = self.job(job_id).await?;
        if record.destination_object.is_some() {
            warn!("Refusing to finalize job {} a second time", job_id);
            return Err(Error::AlreadyFinalized(job_id));
        }

        let stored_name = self.storage.upload(result_name, data).await?;
        let destination = StoredObject::new(stored_name, self.storage.kind());

        match self
            .records
            .set_destination_if_absent(job_id, destination.clone())
            .await
        {
            Ok(_) => {},
            Err(Error::AlreadyFinalized(_)) => {
                warn!("Job {} was finalized concurrently, keeping the first result", job_id);
                self.discard_result(job_id, &destination).await;
                return Err(Error::AlreadyFinalized(job_id));
            },
            Err(e) => return Err(e),
        }

        info!("Finalized job {} with {}", job_id, &destination.name);
        Ok(destination)
    }

    /// Fetches the source image of a job on behalf of the worker.
    pub async fn source_for_worker(&self, job_id: Uuid) -> Result<Bytes> {
        let record = self.job(job_id).await?;
        self.storage.download(&record.source_object.name).await
    }

    /// Looks up a job owned by `owner`.
    ///
    /// Jobs belonging to someone else are reported as not found.
    pub async fn get_job(&self, owner: &OwnerId, job_id: Uuid) -> Result<ProcessingJobRecord> {
        match self.records.get(job_id).await? {
            Some(record) if &record.owner == owner => Ok(record),
            _ => Err(Error::NotFound(format!("job {}", job_id))),
        }
    }

    pub async fn list_jobs(&self, owner: &OwnerId, source_name: &str) -> Result<Vec<ProcessingJobRecord>> {
        self.records.list_for_source(owner, source_name).await
    }

    async fn discard_result(&self, job_id: Uuid, result: &StoredObject) {
        let winner = match self.job(job_id).await {
            Ok(record) => record.destination_object,
            Err(e) => {
                warn!("Can not look up job {} to clean up {}: {}", job_id, &result.name, e);
                return;
            },
        };

        if winner.as_ref() == Some(result) {
            return;
        }

        if let Err(e) = self.storage.delete(&result.name).await {
            warn!("Failed to remove unused result {}: {}", &result.name, e);
        }
    }

    async fn job(&self, job_id: Uuid) -> Result<ProcessingJobRecord> {
        self.records
            .get(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
    }
}
