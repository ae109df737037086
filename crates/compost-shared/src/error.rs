//! Error types for compost.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompostError {
    #[error("error decoding user")]
    DecodeUser,

    #[error("missing region id")]
    MissingRegion,

    #[error("missing vpc id")]
    MissingVpc,

    #[error("missing instance type - must be one of (ec2, rds)")]
    MissingInstanceType,

    #[error("instance type not known: {0}")]
    UnknownInstanceType(String),

    #[error("no metric named {0}")]
    UnknownMetric(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{service} error: {message}")]
    Backend { service: &'static str, message: String },

    #[error("result store error: {0}")]
    Store(String),

    #[error("result store integrity violation: {0}")]
    StoreIntegrity(String),

    #[error("no workers found for {0}")]
    NoWorkersFound(String),

    #[error("service directory error: {0}")]
    Directory(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used to decide how far an error travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input; scoped to the field that raised it
    Input,
    /// A backend the aggregate cannot be built without
    Fatal,
    /// Stored data is not shaped like we wrote it
    Integrity,
    /// Ephemeral worker path; normally swallowed by the dispatcher
    Worker,
}

impl CompostError {
    pub fn backend(service: &'static str, message: impl Into<String>) -> Self {
        CompostError::Backend {
            service,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CompostError::DecodeUser
            | CompostError::MissingRegion
            | CompostError::MissingVpc
            | CompostError::MissingInstanceType
            | CompostError::UnknownInstanceType(_)
            | CompostError::UnknownMetric(_)
            | CompostError::InvalidInput(_)
            | CompostError::Json(_) => ErrorKind::Input,
            CompostError::Backend { .. } | CompostError::Store(_) => ErrorKind::Fatal,
            CompostError::StoreIntegrity(_) => ErrorKind::Integrity,
            CompostError::NoWorkersFound(_)
            | CompostError::Directory(_)
            | CompostError::Worker(_) => ErrorKind::Worker,
        }
    }
}
