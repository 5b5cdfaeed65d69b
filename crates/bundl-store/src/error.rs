use bundl_types::{LockMode, TypeError};

/// Errors from storage gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The path (or its parent folder) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The storage policy refuses the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The backend cannot be reached.
    #[error("storage not available: {0}")]
    Unavailable(String),

    /// The write would exceed the quota of the target folder.
    #[error("insufficient storage under '{path}': need {needed} bytes, {available} available")]
    InsufficientStorage {
        path: String,
        needed: u64,
        available: u64,
    },

    /// The path failed normalisation.
    #[error(transparent)]
    InvalidPath(#[from] TypeError),

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the locking provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The lock could not be obtained in the requested mode.
    #[error("\"{path}\" is locked ({mode} lock requested)")]
    Locked { path: String, mode: LockMode },
}

impl LockError {
    pub fn locked(path: &str, mode: LockMode) -> Self {
        Self::Locked { path: path.to_string(), mode }
    }
}

/// Result alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;
