//! Storage and locking capabilities for bundled uploads.
//!
//! The upload pipeline never touches a filesystem directly. Everything it
//! needs from the hierarchical file store is expressed by [`StorageGateway`],
//! and every lock it takes goes through a [`LockProvider`].
//!
//! # Backends
//!
//! - [`InMemoryStorage`] -- `HashMap`-based store for tests and embedding,
//!   with switches for quota, outages and failing renames
//! - [`FsStorage`] -- a directory on the local filesystem
//! - [`InMemoryLockProvider`] -- process-local shared/exclusive locks
//!
//! # Design Rules
//!
//! 1. Paths are relative, slash-separated, and normalised by the backend.
//! 2. A [`LockGuard`] releases whatever mode it holds when dropped.
//! 3. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod lock;
pub mod memory;
pub mod traits;

pub use error::{LockError, LockResult, StoreError, StoreResult};
pub use fs::FsStorage;
pub use lock::{InMemoryLockProvider, LockGuard};
pub use memory::InMemoryStorage;
pub use traits::{LockProvider, NodeKind, StorageGateway};
