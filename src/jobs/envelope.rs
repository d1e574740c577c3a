//! The JSON messages exchanged with the processing worker.
//!
//! Field names follow what the worker already speaks, which is why they
//! differ from the Rust side names.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ImageFormat;
use crate::error::{Error, Result};

/// A transformation job as handed to the worker.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobEnvelope {
    /// Assigned before dispatch, `null` on the wire until then.
    pub job_id: Option<Uuid>,

    /// The storage name of the image to transform.
    #[serde(rename = "image_path")]
    pub source_object_name: String,

    #[serde(rename = "resize_image_to_width")]
    pub target_width: u32,

    #[serde(rename = "resize_image_to_height")]
    pub target_height: u32,

    #[serde(rename = "change_to_format")]
    pub target_format: ImageFormat,
}

impl JobEnvelope {
    pub fn new(
        source_object_name: impl Into<String>,
        target_width: u32,
        target_height: u32,
        target_format: ImageFormat,
    ) -> Self {
        Self {
            job_id: None,
            source_object_name: source_object_name.into(),
            target_width,
            target_height,
            target_format,
        }
    }

    pub fn with_job_id(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Checks everything the type system does not already guarantee.
    pub fn validate(&self) -> Result<()> {
        if self.source_object_name.is_empty() {
            return Err(Error::Validation("job source object name is empty".to_string()));
        }

        if self.target_width == 0 || self.target_height == 0 {
            return Err(Error::Validation(format!(
                "job target size must be non-zero, got {}x{}",
                self.target_width, self.target_height,
            )));
        }

        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::Validation(format!("failed to encode job envelope: {}", e)))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let envelope: Self = serde_json::from_slice(data)
            .map_err(|e| Error::Validation(format!("malformed job envelope: {}", e)))?;
        envelope.validate()?;
        Ok(envelope)
    }
}

/// The worker's acknowledgement that it took the job.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobConfirmation {
    #[serde(rename = "is_ok")]
    pub accepted: bool,
}

impl JobConfirmation {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::Validation(format!("failed to encode confirmation: {}", e)))
    }

    /// Decodes a confirmation reply.
    ///
    /// The worker may send the confirmation object itself or the object
    /// serialized into a JSON string, both are accepted.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let malformed =
            |e: serde_json::Error| Error::Validation(format!("malformed job confirmation: {}", e));

        match serde_json::from_slice::<serde_json::Value>(data).map_err(malformed)? {
            serde_json::Value::String(inner) => serde_json::from_str(&inner).map_err(malformed),
            value => serde_json::from_value(value).map_err(malformed),
        }
    }
}
