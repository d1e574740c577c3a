//! Image storage over pluggable backends, with transformation jobs handed
//! to an external worker over a request/reply channel.
//!
//! The pieces are built once at startup and shared:
//!
//! - a [`storage::template::StorageBackend`] selected by
//!   [`storage::backends::StorageConfig::connect`],
//! - a [`jobs::JobSubmitter`] holding the one channel to the worker,
//! - a [`jobs::JobManager`] applying the job lifecycle on top of both.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod controller;
pub mod error;
pub mod jobs;
pub mod storage;
mod utils;


pub use config::{ImageFormat, RuntimeConfig, WorkerConfig};
pub use controller::{ObjectController, UploadInfo};
pub use error::{Error, ErrorKind, Result};
pub use storage::template::StorageBackend;
pub use storage::{BackendKind, StoredObject};
