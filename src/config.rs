use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Error, Result};
use crate::storage::backends::StorageConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// The storage backend configuration.
    ///
    /// Exactly one backend is constructed from this at startup.
    pub storage: StorageConfig,

    /// Where the processing worker can be reached.
    pub worker: WorkerConfig,
}

impl RuntimeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(data)?;
        cfg.worker.validate()?;
        Ok(cfg)
    }

    /// An example configuration for the given backend kind.
    ///
    /// Used by `pixeldock init` to give operators something to fill in.
    pub fn template(backend: &str) -> Result<Self> {
        Ok(Self {
            storage: StorageConfig::template(backend)?,
            worker: WorkerConfig {
                host: "127.0.0.1".to_string(),
                port: 5555,
                reply_timeout_secs: default_reply_timeout(),
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// The host the worker's reply socket is bound on.
    pub host: String,

    /// The port the worker's reply socket is bound on.
    pub port: u16,

    #[serde(default = "default_reply_timeout")]
    /// How long to wait for the worker to confirm a job, in seconds.
    ///
    /// Defaults to `30`.
    pub reply_timeout_secs: u64,
}

impl WorkerConfig {
    #[inline]
    pub fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    #[inline]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Validation("worker.host must not be empty".to_string()));
        }

        if self.reply_timeout_secs == 0 {
            return Err(Error::Validation(
                "worker.reply_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

const fn default_reply_timeout() -> u64 {
    30
}

/// The raster formats the worker can produce.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Tiff,
}

impl ImageFormat {
    #[inline]
    pub fn variants() -> &'static [Self] {
        &[
            Self::Png,
            Self::Jpeg,
            Self::Webp,
            Self::Gif,
            Self::Bmp,
            Self::Tiff,
        ]
    }

    /// Parses caller supplied input into a supported format.
    pub fn parse(value: &str) -> Result<Self> {
        value.trim().parse::<Self>().map_err(|_| {
            Error::Validation(format!(
                "unsupported image format {:?}, expected one of {}",
                value,
                Self::variants()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>()
                    .join(", "),
            ))
        })
    }
}
