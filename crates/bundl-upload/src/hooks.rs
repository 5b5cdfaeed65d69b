use crate::outcome::CommitOutcome;

/// Decision returned by [`UploadHook::before_bundle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookDecision {
    Allow,
    Reject { reason: String },
}

/// Extension points around a bundle.
pub trait UploadHook: Send + Sync {
    /// Called once the envelope is valid and before any part is read.
    fn before_bundle(&self, collection: &str) -> HookDecision;

    /// Called after each manifest entry has been resolved.
    fn after_entry(&self, _path: &str, _outcome: &CommitOutcome) {}
}

pub struct NoOpHook;

impl UploadHook for NoOpHook {
    fn before_bundle(&self, _collection: &str) -> HookDecision {
        HookDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureKind;

    #[test]
    fn noop_hook_allows() {
        assert_eq!(NoOpHook.before_bundle("files"), HookDecision::Allow);
        NoOpHook.after_entry("a.txt", &CommitOutcome::failed(FailureKind::BadRequest, "x"));
    }
}
