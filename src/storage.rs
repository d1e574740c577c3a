use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::{Error, Result};

pub mod backends;
pub mod template;

/// Which physical store an object lives in.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    Local,
    S3,
    Azure,
}

/// A named blob living in exactly one backend.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// The backend relative name the object was stored under.
    pub name: String,

    /// The backend holding the object.
    pub backend: BackendKind,
}

impl StoredObject {
    pub fn new(name: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }
}

/// Strips every path component from a caller supplied file name.
///
/// Both `/` and `\` count as separators regardless of platform so a name
/// can never address anything outside of a backend's root.
pub fn object_basename(name: &str) -> Result<&str> {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    match base {
        "" | "." | ".." => Err(Error::Validation(format!(
            "{:?} does not contain a usable file name",
            name,
        ))),
        other => Ok(other),
    }
}

/// Object keys are used verbatim by the object stores but must not be empty.
pub(crate) fn validate_key(name: &str) -> Result<()> {
    if name.is_empty() {
        Err(Error::Validation("object name must not be empty".to_string()))
    } else {
        Ok(())
    }
}
