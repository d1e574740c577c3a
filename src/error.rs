use std::io;

use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// The flat set of failure categories callers react to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Unavailable,
    ValidationFailure,
    Rejected,
    TransportFailure,
    AlreadyFinalized,
    JobStore,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("worker rejected job {0:?}")]
    Rejected(Option<Uuid>),

    #[error("worker transport failure: {0}")]
    Transport(String),

    #[error("job {0} has already been finalized")]
    AlreadyFinalized(Uuid),

    #[error("job store failure: {0}")]
    JobStore(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::Transport(_) => ErrorKind::TransportFailure,
            Self::AlreadyFinalized(_) => ErrorKind::AlreadyFinalized,
            Self::JobStore(_) => ErrorKind::JobStore,
        }
    }

    pub(crate) fn missing_field(backend: &str, field: &str) -> Self {
        Self::Validation(format!(
            "storage backend is set to {}, but {} is unset",
            backend, field,
        ))
    }

    /// Maps a filesystem error for the object `name` onto the storage categories.
    pub(crate) fn from_io(name: &str, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(name.to_string()),
            io::ErrorKind::PermissionDenied => Self::AccessDenied(format!("{}: {}", name, e)),
            _ => Self::Unavailable(format!("{}: {}", name, e)),
        }
    }

    /// Maps a remote store HTTP status code onto the storage categories.
    pub(crate) fn from_status(name: &str, code: u16) -> Self {
        match code {
            404 => Self::NotFound(name.to_string()),
            401 | 403 => Self::AccessDenied(format!(
                "{}: remote storage responded with status {}",
                name, code,
            )),
            _ => Self::Unavailable(format!(
                "{}: remote storage did not respond correctly, got status {}",
                name, code,
            )),
        }
    }
}
