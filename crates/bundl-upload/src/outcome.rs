//! Per-entry results and the report they add up to.

use bundl_protocol::{MultiStatus, StatusEntry};
use bundl_store::StoreError;
use hyper::StatusCode;

use crate::error::CommitError;

/// Closed set of failure classes an entry can end in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    BadRequest,
    Forbidden,
    Locked,
    ServiceUnavailable,
    InsufficientStorage,
}

impl FailureKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Locked => StatusCode::LOCKED,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BadRequest",
            Self::Forbidden => "Forbidden",
            Self::Locked => "Locked",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::InsufficientStorage => "InsufficientStorage",
        }
    }

    pub(crate) fn from_store(e: &StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::BadRequest,
            StoreError::Forbidden(_) | StoreError::InvalidPath(_) => Self::Forbidden,
            StoreError::InsufficientStorage { .. } => Self::InsufficientStorage,
            StoreError::Unavailable(_) | StoreError::Io(_) => Self::ServiceUnavailable,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful commit reports back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Double-quoted etag, ready for the response.
    pub etag: String,
    pub file_id: String,
    pub mtime_accepted: bool,
}

/// Result of one manifest entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitReceipt),
    Failed { kind: FailureKind, message: String },
}

impl CommitOutcome {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed { kind, message: message.into() }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Committed(_) => StatusCode::OK,
            Self::Failed { kind, .. } => kind.status(),
        }
    }

    /// Render as one multi-status entry for `href`.
    pub fn to_status_entry(&self, href: &str) -> StatusEntry {
        match self {
            Self::Committed(receipt) => {
                let mut props = vec![
                    ("etag".to_string(), receipt.etag.clone()),
                    ("oc-etag".to_string(), receipt.etag.clone()),
                    ("oc-fileid".to_string(), receipt.file_id.clone()),
                ];
                if receipt.mtime_accepted {
                    props.push(("x-oc-mtime".to_string(), "accepted".to_string()));
                }
                StatusEntry::properties(href, StatusCode::OK, props)
            }
            Self::Failed { kind, message } => {
                StatusEntry::error(href, kind.status(), kind.as_str(), message.clone())
            }
        }
    }
}

impl From<Result<CommitReceipt, CommitError>> for CommitOutcome {
    fn from(result: Result<CommitReceipt, CommitError>) -> Self {
        match result {
            Ok(receipt) => Self::Committed(receipt),
            Err(e) => Self::failed(e.kind(), e.to_string()),
        }
    }
}

/// Outcomes of every manifest entry, in manifest order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleReport {
    entries: Vec<(String, CommitOutcome)>,
}

impl BundleReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, outcome: CommitOutcome) {
        self.entries.push((path.into(), outcome));
    }

    pub fn entries(&self) -> &[(String, CommitOutcome)] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&CommitOutcome> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, o)| o)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn committed(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_committed()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.committed()
    }

    pub fn to_multistatus(&self) -> MultiStatus {
        let mut ms = MultiStatus::new();
        for (path, outcome) in &self.entries {
            ms.push(outcome.to_status_entry(path));
        }
        ms
    }
}
