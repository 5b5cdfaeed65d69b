use std::io::Write;

use bundl_types::LockMode;

use crate::error::{LockResult, StoreResult};

/// Kind of node found at a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Hierarchical file storage as seen by the upload pipeline.
///
/// All implementations must satisfy these invariants:
/// - Paths are relative to the storage root; `""` is the root directory.
/// - `rename` replaces the target atomically from the reader's point of view.
/// - Etags change whenever content or mtime changes and `refresh` has run.
/// - All I/O errors are propagated, never silently ignored.
pub trait StorageGateway: Send + Sync {
    /// What lives at `path`, or `Ok(None)` if nothing does.
    fn node_kind(&self, path: &str) -> StoreResult<Option<NodeKind>>;

    /// Whether a regular file exists at `path`.
    fn file_exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.node_kind(path)? == Some(NodeKind::File))
    }

    /// Whether the caller may create new entries inside `folder`.
    fn is_creatable(&self, folder: &str) -> StoreResult<bool>;

    /// Whether writes to `path` must go through a staged part file.
    fn needs_part_file(&self, path: &str) -> bool;

    /// Bytes that may still be written under `folder`, `None` if unlimited.
    fn free_space(&self, folder: &str) -> StoreResult<Option<u64>>;

    /// Open `path` for writing, truncating any previous content.
    fn open_write(&self, path: &str) -> StoreResult<Box<dyn Write + '_>>;

    /// Remove the file at `path`. Returns `true` if it existed.
    fn remove(&self, path: &str) -> StoreResult<bool>;

    /// Move `from` to `to`. Returns `false` if the backend declined.
    fn rename(&self, from: &str, to: &str) -> StoreResult<bool>;

    /// Refresh cached metadata for `path` after a write.
    fn refresh(&self, path: &str) -> StoreResult<()>;

    /// Set the modification time (seconds since the epoch).
    ///
    /// Returns `false` if the backend does not support it.
    fn touch(&self, path: &str, mtime: i64) -> StoreResult<bool>;

    /// Current etag of the file at `path`, unquoted.
    fn etag(&self, path: &str) -> StoreResult<String>;

    /// Stable identifier of the file at `path`.
    fn file_id(&self, path: &str) -> StoreResult<String>;
}

/// Locking provider arbitrating access to resource paths.
///
/// Acquisition never waits: a conflicting holder yields
/// [`LockError::Locked`](crate::LockError::Locked) immediately.
pub trait LockProvider: Send + Sync {
    /// Take a new lock on `path` in `mode`.
    fn acquire(&self, path: &str, mode: LockMode) -> LockResult<()>;

    /// Convert a lock already held on `path` into `target` mode.
    ///
    /// Converting to exclusive fails if anyone else holds a shared lock.
    fn change(&self, path: &str, target: LockMode) -> LockResult<()>;

    /// Release a lock held on `path` in `mode`.
    fn release(&self, path: &str, mode: LockMode);
}
