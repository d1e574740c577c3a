pub mod envelope;
pub mod lifecycle;
pub mod records;
pub mod submitter;
pub mod transport;

pub use envelope::{JobConfirmation, JobEnvelope};
pub use lifecycle::{JobManager, JobRequest};
pub use records::{JobState, JobStore, MemoryJobStore, OwnerId, ProcessingJobRecord};
pub use submitter::JobSubmitter;
