use std::io::Read;
use std::sync::Arc;

use bundl_protocol::{assemble, BinaryTable, BundleEnvelope, FileAttributes, ParserOptions};
use bundl_store::{LockGuard, LockProvider, NodeKind, StorageGateway};
use bundl_types::{join_path, normalize_path, split_path, LockMode};
use tracing::{debug, info, warn};

use crate::cache::ParentValidityCache;
use crate::committer::FileCommitter;
use crate::error::{UploadError, UploadResult};
use crate::hooks::{HookDecision, NoOpHook, UploadHook};
use crate::outcome::{BundleReport, CommitOutcome, FailureKind};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

const PARENT_INVALID: &str =
    "file creation on not existing or without creation permission parent folder is not permitted";
const MISSING_CONTENT_ID: &str = "manifest entry has no content-id, multistatus entry cannot be constructed";
const MISSING_BINARY: &str =
    "file object has no associated data binaries, wrong metadata or corrupted file contents";

// ---------------------------------------------------------------------------
// BundleOrchestrator
// ---------------------------------------------------------------------------

/// Drives one bundled upload from raw request to per-entry report.
///
/// Entries are processed strictly one after another in manifest order. Each
/// entry's lock is acquired and released before the next entry starts.
pub struct BundleOrchestrator {
    storage: Arc<dyn StorageGateway>,
    locks: Arc<dyn LockProvider>,
    hook: Arc<dyn UploadHook>,
    options: ParserOptions,
}

impl BundleOrchestrator {
    pub fn new(storage: Arc<dyn StorageGateway>, locks: Arc<dyn LockProvider>) -> Self {
        Self {
            storage,
            locks,
            hook: Arc::new(NoOpHook),
            options: ParserOptions::default(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn UploadHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn storage(&self) -> &Arc<dyn StorageGateway> {
        &self.storage
    }

    /// Handle a bundle posted to `collection`.
    ///
    /// Envelope problems (unknown collection, bad `Content-Type`, broken
    /// framing, missing manifest) fail the whole request. Everything that goes
    /// wrong for a single entry ends up in that entry's outcome.
    pub fn handle<R: Read>(
        &self,
        collection: &str,
        content_type: Option<&str>,
        body: R,
    ) -> UploadResult<BundleReport> {
        let home = self.validate_collection(collection)?;
        let envelope = BundleEnvelope::parse(content_type)?;

        if let HookDecision::Reject { reason } = self.hook.before_bundle(&home) {
            warn!(collection = %home, %reason, "bundle rejected by hook");
            return Err(UploadError::Forbidden(format!(
                "beforeWriteBundle preconditions failed: {reason}"
            )));
        }

        let mut contents = assemble(body, &envelope, self.options)?;
        let mut parents = ParentValidityCache::new();
        let mut report = BundleReport::new();

        for (path, attrs) in &contents.manifest {
            let outcome = self.process_entry(&home, path, attrs, &mut contents.binaries, &mut parents);
            if let CommitOutcome::Failed { kind, message } = &outcome {
                warn!(%path, %kind, %message, "bundle entry failed");
            }
            self.hook.after_entry(path, &outcome);
            report.push(path.clone(), outcome);
        }

        info!(
            collection = %home,
            entries = report.len(),
            committed = report.committed(),
            failed = report.failed(),
            "bundle processed"
        );
        Ok(report)
    }

    fn validate_collection(&self, collection: &str) -> UploadResult<String> {
        let home = normalize_path(collection)?;
        match self.storage.node_kind(&home)? {
            Some(NodeKind::Directory) => Ok(home),
            Some(NodeKind::File) => Err(UploadError::NotACollection(home)),
            None => Err(UploadError::CollectionNotFound(home)),
        }
    }

    fn process_entry(
        &self,
        home: &str,
        path: &str,
        attrs: &FileAttributes,
        binaries: &mut BinaryTable,
        parents: &mut ParentValidityCache,
    ) -> CommitOutcome {
        // Locks and the parent cache are keyed by the canonical path, so every
        // spelling of a file contends for the same lock.
        let target = match normalize_path(&join_path(home, path)) {
            Ok(target) => target,
            Err(e) => return CommitOutcome::failed(FailureKind::Forbidden, e.to_string()),
        };
        let (folder_path, _) = split_path(&target);

        let parent_ok = parents.check(folder_path, || {
            Ok(self.storage.node_kind(folder_path)? == Some(NodeKind::Directory)
                && self.storage.is_creatable(folder_path)?)
        });
        match parent_ok {
            Ok(true) => {}
            Ok(false) => return CommitOutcome::failed(FailureKind::BadRequest, PARENT_INVALID),
            Err(e) => return CommitOutcome::failed(FailureKind::from_store(&e), e.to_string()),
        }

        let Some(content_id) = attrs.content_id.as_deref() else {
            return CommitOutcome::failed(FailureKind::BadRequest, MISSING_CONTENT_ID);
        };
        let Some(body) = binaries.get_mut(content_id) else {
            return CommitOutcome::failed(FailureKind::BadRequest, MISSING_BINARY);
        };

        let mut lock = match LockGuard::acquire(self.locks.as_ref(), &target, LockMode::Shared) {
            Ok(lock) => lock,
            Err(e) => return CommitOutcome::failed(FailureKind::BadRequest, e.to_string()),
        };

        debug!(%path, %target, content_id, bytes = body.len(), "committing entry");
        let result = FileCommitter::new(self.storage.as_ref()).commit(&mut lock, &target, body, attrs.mtime);
        drop(lock);
        result.into()
    }
}

impl std::fmt::Debug for BundleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleOrchestrator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
