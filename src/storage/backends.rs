pub mod azure;
pub mod blob_storage;
pub mod filesystem;
mod register;

pub use register::{AzureConfig, LocalConfig, S3Config, StorageConfig};
