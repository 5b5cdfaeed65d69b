use bundl_protocol::ProtocolError;
use bundl_store::{LockError, StoreError};
use bundl_types::TypeError;
use hyper::StatusCode;
use thiserror::Error;

use crate::outcome::FailureKind;

/// Why a single manifest entry could not be committed.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("file '{0}' already exists, cannot create file")]
    AlreadyExists(String),

    #[error(transparent)]
    InvalidPath(#[from] TypeError),

    #[error("insufficient storage for '{path}': need {needed} bytes, {available} available")]
    InsufficientStorage {
        path: String,
        needed: u64,
        available: u64,
    },

    #[error("expected filesize {expected} got {copied} for '{path}'")]
    Transport {
        path: String,
        expected: u64,
        copied: u64,
    },

    #[error("error while copying file to target location: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Locked(#[from] LockError),

    #[error("could not rename part file '{from}' to final file '{to}'")]
    RenameFailed { from: String, to: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommitError {
    /// Classify for the multi-status entry.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AlreadyExists(_) | Self::InvalidPath(_) => FailureKind::Forbidden,
            Self::InsufficientStorage { .. } => FailureKind::InsufficientStorage,
            Self::Transport { .. } | Self::Io(_) | Self::RenameFailed { .. } => FailureKind::BadRequest,
            Self::Locked(_) => FailureKind::Locked,
            Self::Store(e) => FailureKind::from_store(e),
        }
    }
}

pub type CommitResult<T> = Result<T, CommitError>;

/// Errors that fail the whole request before any entry is processed.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Envelope(#[from] ProtocolError),

    #[error("invalid collection path: {0}")]
    InvalidCollection(#[from] TypeError),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("target is not a collection: {0}")]
    NotACollection(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage not available: {0}")]
    Unavailable(String),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Exception kind reported in the error document.
    pub fn exception(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => FailureKind::Forbidden.as_str(),
            Self::Unavailable(_) => FailureKind::ServiceUnavailable.as_str(),
            _ => FailureKind::BadRequest.as_str(),
        }
    }
}

impl From<StoreError> for UploadError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => Self::CollectionNotFound(path),
            StoreError::Forbidden(msg) => Self::Forbidden(msg),
            StoreError::InvalidPath(e) => Self::InvalidCollection(e),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
