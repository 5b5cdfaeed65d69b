//! Bundle orchestration and file commits.
//!
//! [`BundleOrchestrator::handle`] validates the target collection and the
//! envelope, assembles the bundle, then walks the manifest. Every entry is
//! checked (parent folder, content-id, binary), locked, and handed to the
//! [`FileCommitter`]. Per-entry failures never abort the bundle; they become
//! [`CommitOutcome::Failed`] entries of the [`BundleReport`].

pub mod cache;
pub mod committer;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod outcome;

pub use cache::ParentValidityCache;
pub use committer::{part_file_path, FileCommitter, StagedFile};
pub use error::{CommitError, CommitResult, UploadError, UploadResult};
pub use hooks::{HookDecision, NoOpHook, UploadHook};
pub use orchestrator::BundleOrchestrator;
pub use outcome::{BundleReport, CommitOutcome, CommitReceipt, FailureKind};
