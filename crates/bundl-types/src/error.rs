use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: String },
}

impl TypeError {
    pub(crate) fn path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.to_string(), reason: reason.into() }
    }

    pub(crate) fn name(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFileName { name: name.to_string(), reason: reason.into() }
    }
}
