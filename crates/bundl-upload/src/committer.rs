//! Writes one part body to its final path.
//!
//! The committer assumes its caller already holds a shared lock on the target
//! and hands that lock in, so the upgrade to exclusive for the final move and
//! the downgrade afterwards happen on the same lock the caller releases.

use std::io::{self, Write};

use bundl_protocol::PartBody;
use bundl_store::{LockGuard, StorageGateway};
use bundl_types::{split_path, validate_file_name};
use tracing::{debug, warn};

use crate::error::{CommitError, CommitResult};
use crate::outcome::CommitReceipt;

/// A file written during a commit that is removed on drop unless the commit
/// went through.
///
/// Covers both staged part files and direct writes: in either case the path
/// did not exist before the commit started.
pub struct StagedFile<'a> {
    storage: &'a dyn StorageGateway,
    path: String,
    committed: bool,
}

impl<'a> StagedFile<'a> {
    pub fn new(storage: &'a dyn StorageGateway, path: impl Into<String>) -> Self {
        Self {
            storage,
            path: path.into(),
            committed: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Follow the file to `path` after it was moved there.
    pub fn moved_to(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Keep the file.
    pub fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for StagedFile<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match self.storage.remove(&self.path) {
            Ok(_) => debug!(path = %self.path, "removed uncommitted file"),
            Err(e) => warn!(path = %self.path, error = %e, "failed to remove uncommitted file"),
        }
    }
}

/// Name of the part file staging a write to `target`.
pub fn part_file_path(target: &str, transfer_id: u32) -> String {
    format!("{target}.ocTransferId{transfer_id}.part")
}

/// Creates files through a [`StorageGateway`].
pub struct FileCommitter<'a> {
    storage: &'a dyn StorageGateway,
}

impl<'a> FileCommitter<'a> {
    pub fn new(storage: &'a dyn StorageGateway) -> Self {
        Self { storage }
    }

    /// Create `target` with the content of `body`.
    ///
    /// `lock` must be a shared lock on `target`. It is upgraded for the final
    /// move and downgraded again before returning; the caller releases it.
    /// Whatever was written is removed again if the commit fails.
    pub fn commit(
        &self,
        lock: &mut LockGuard<'_>,
        target: &str,
        body: &mut PartBody,
        mtime: Option<i64>,
    ) -> CommitResult<CommitReceipt> {
        if self.storage.node_kind(target)?.is_some() {
            return Err(CommitError::AlreadyExists(target.to_string()));
        }

        let (folder, name) = split_path(target);
        validate_file_name(name)?;

        let needed = body.len();
        if let Some(available) = self.storage.free_space(folder)? {
            if needed > available {
                return Err(CommitError::InsufficientStorage {
                    path: target.to_string(),
                    needed,
                    available,
                });
            }
        }

        let staged = self.storage.needs_part_file(target) && target.len() > 1;
        let write_path = if staged {
            part_file_path(target, rand::random::<u32>())
        } else {
            target.to_string()
        };

        let mut pending = StagedFile::new(self.storage, write_path);
        let copied = self.copy_body(pending.path(), body)?;
        if copied != needed {
            return Err(CommitError::Transport {
                path: target.to_string(),
                expected: needed,
                copied,
            });
        }

        lock.upgrade()?;

        if staged {
            let part = pending.path().to_string();
            let renamed = self.storage.rename(&part, target)?;
            if renamed {
                pending.moved_to(target);
            }
            if !renamed || !self.storage.file_exists(target)? {
                warn!(%part, %target, "renaming part file to final file failed");
                return Err(CommitError::RenameFailed { from: part, to: target.to_string() });
            }
        }

        // The new file stays owned by `pending` until the receipt is built, so
        // a failure from here on removes it again.
        self.storage.refresh(target)?;
        lock.downgrade()?;

        let mtime_accepted = match mtime {
            Some(mtime) => match self.storage.touch(target, mtime) {
                Ok(applied) => applied,
                Err(e) => {
                    warn!(%target, mtime, error = %e, "could not apply client mtime");
                    false
                }
            },
            None => false,
        };

        let etag = self.storage.etag(target)?;
        let file_id = self.storage.file_id(target)?;
        pending.commit();
        debug!(%target, bytes = copied, staged, %etag, "committed file");

        Ok(CommitReceipt {
            etag: format!("\"{etag}\""),
            file_id,
            mtime_accepted,
        })
    }

    fn copy_body(&self, path: &str, body: &mut PartBody) -> CommitResult<u64> {
        body.rewind()?;
        let mut writer = self.storage.open_write(path)?;
        let copied = io::copy(body, &mut writer)?;
        writer.flush()?;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundl_store::{InMemoryLockProvider, InMemoryStorage, LockProvider};
    use bundl_types::LockMode;

    use crate::outcome::FailureKind;

    fn body(data: &[u8]) -> PartBody {
        PartBody::from_bytes(data).unwrap()
    }

    fn setup() -> (InMemoryStorage, InMemoryLockProvider) {
        let store = InMemoryStorage::new();
        store.mkdir("files").unwrap();
        (store, InMemoryLockProvider::new())
    }

    fn commit(
        store: &InMemoryStorage,
        locks: &InMemoryLockProvider,
        target: &str,
        data: &[u8],
        mtime: Option<i64>,
    ) -> CommitResult<CommitReceipt> {
        let mut guard = LockGuard::acquire(locks, target, LockMode::Shared).unwrap();
        FileCommitter::new(store).commit(&mut guard, target, &mut body(data), mtime)
    }

    #[test]
    fn commits_through_part_file() {
        let (store, locks) = setup();
        let receipt = commit(&store, &locks, "files/a.txt", b"hello", None).unwrap();
        assert_eq!(store.read_file("files/a.txt").unwrap(), b"hello");
        assert_eq!(store.file_paths(), ["files/a.txt"]);
        assert!(receipt.etag.starts_with('"') && receipt.etag.ends_with('"'));
        assert_eq!(receipt.etag.trim_matches('"'), store.etag("files/a.txt").unwrap());
        assert!(!receipt.mtime_accepted);
        assert_eq!(store.refreshed(), ["files/a.txt"]);
        assert!(locks.is_idle());
    }

    #[test]
    fn commits_directly_without_part_files() {
        let store = InMemoryStorage::new().with_part_files(false);
        store.mkdir("files").unwrap();
        let locks = InMemoryLockProvider::new();
        commit(&store, &locks, "files/a.txt", b"direct", None).unwrap();
        assert_eq!(store.read_file("files/a.txt").unwrap(), b"direct");
    }

    #[test]
    fn lock_ends_shared_after_commit() {
        let (store, locks) = setup();
        let mut guard = LockGuard::acquire(&locks, "files/a.txt", LockMode::Shared).unwrap();
        FileCommitter::new(&store)
            .commit(&mut guard, "files/a.txt", &mut body(b"x"), None)
            .unwrap();
        assert_eq!(guard.mode(), LockMode::Shared);
        assert_eq!(locks.held("files/a.txt"), Some((LockMode::Shared, 1)));
    }

    #[test]
    fn applies_mtime() {
        let (store, locks) = setup();
        let receipt = commit(&store, &locks, "files/a.txt", b"x", Some(1_500_000_000)).unwrap();
        assert!(receipt.mtime_accepted);
        assert_eq!(store.mtime("files/a.txt"), Some(1_500_000_000));
    }

    #[test]
    fn existing_target_is_forbidden() {
        let (store, locks) = setup();
        store.put_file("files/a.txt", b"old").unwrap();
        let err = commit(&store, &locks, "files/a.txt", b"new", None).unwrap_err();
        assert!(matches!(err, CommitError::AlreadyExists(_)));
        assert_eq!(err.kind(), FailureKind::Forbidden);
        assert_eq!(store.read_file("files/a.txt").unwrap(), b"old");
    }

    #[test]
    fn existing_folder_is_forbidden() {
        let (store, locks) = setup();
        store.mkdir("files/sub").unwrap();
        let err = commit(&store, &locks, "files/sub", b"x", None).unwrap_err();
        assert!(matches!(err, CommitError::AlreadyExists(_)));
    }

    #[test]
    fn bad_file_name_is_forbidden() {
        let (store, locks) = setup();
        let err = commit(&store, &locks, "files/trailing ", b"x", None).unwrap_err();
        assert!(matches!(err, CommitError::InvalidPath(_)));
        assert_eq!(err.kind(), FailureKind::Forbidden);
        assert!(store.file_paths().is_empty());
    }

    #[test]
    fn quota_checked_before_writing() {
        let (store, locks) = setup();
        store.set_quota(Some(4));
        let err = commit(&store, &locks, "files/a.txt", b"hello", None).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InsufficientStorage);
        assert!(store.file_paths().is_empty());
    }

    #[test]
    fn broken_write_removes_part_file() {
        let (store, locks) = setup();
        store.set_write_limit(Some(2));
        let err = commit(&store, &locks, "files/a.txt", b"hello", None).unwrap_err();
        assert!(matches!(err, CommitError::Io(_)));
        assert_eq!(err.kind(), FailureKind::BadRequest);
        assert!(store.file_paths().is_empty());
    }

    #[test]
    fn broken_direct_write_removes_target() {
        let store = InMemoryStorage::new().with_part_files(false);
        store.mkdir("files").unwrap();
        store.set_write_limit(Some(2));
        let locks = InMemoryLockProvider::new();
        assert!(commit(&store, &locks, "files/a.txt", b"hello", None).is_err());
        assert!(store.file_paths().is_empty());
    }

    #[test]
    fn contended_lock_is_locked_and_cleans_up() {
        let (store, locks) = setup();
        locks.acquire("files/a.txt", LockMode::Shared).unwrap();
        let err = commit(&store, &locks, "files/a.txt", b"hello", None).unwrap_err();
        assert!(matches!(err, CommitError::Locked(_)));
        assert_eq!(err.kind(), FailureKind::Locked);
        assert!(store.file_paths().is_empty());
        assert_eq!(locks.held("files/a.txt"), Some((LockMode::Shared, 1)));
    }

    #[test]
    fn failed_rename_cleans_up() {
        let (store, locks) = setup();
        store.set_fail_renames(true);
        let err = commit(&store, &locks, "files/a.txt", b"hello", None).unwrap_err();
        assert!(matches!(err, CommitError::RenameFailed { .. }));
        assert!(store.file_paths().is_empty());
        assert!(locks.is_idle());
    }

    #[test]
    fn failed_refresh_removes_the_moved_file() {
        let (store, locks) = setup();
        store.set_fail_refresh(true);
        let err = commit(&store, &locks, "files/a.txt", b"hello", None).unwrap_err();
        assert!(matches!(err, CommitError::Store(_)));
        assert_eq!(err.kind(), FailureKind::ServiceUnavailable);
        assert!(store.file_paths().is_empty());
        assert!(locks.is_idle());

        store.set_fail_refresh(false);
        commit(&store, &locks, "files/a.txt", b"hello", None).unwrap();
        assert_eq!(store.read_file("files/a.txt").unwrap(), b"hello");
    }

    #[test]
    fn failed_refresh_removes_a_direct_write() {
        let store = InMemoryStorage::new().with_part_files(false);
        store.mkdir("files").unwrap();
        store.set_fail_refresh(true);
        let locks = InMemoryLockProvider::new();
        assert!(commit(&store, &locks, "files/a.txt", b"hello", None).is_err());
        assert!(store.file_paths().is_empty());
    }

    #[test]
    fn missing_parent_is_reported() {
        let (store, locks) = setup();
        let err = commit(&store, &locks, "nowhere/a.txt", b"x", None).unwrap_err();
        assert_eq!(err.kind(), FailureKind::BadRequest);
    }

    #[test]
    fn body_is_reusable_across_commits() {
        let (store, locks) = setup();
        let mut shared = body(b"same");
        for target in ["files/a.txt", "files/b.txt"] {
            let mut guard = LockGuard::acquire(&locks, target, LockMode::Shared).unwrap();
            FileCommitter::new(&store).commit(&mut guard, target, &mut shared, None).unwrap();
        }
        assert_eq!(store.read_file("files/a.txt").unwrap(), b"same");
        assert_eq!(store.read_file("files/b.txt").unwrap(), b"same");
    }

    #[test]
    fn part_file_naming() {
        assert_eq!(part_file_path("files/a.txt", 42), "files/a.txt.ocTransferId42.part");
    }
}
