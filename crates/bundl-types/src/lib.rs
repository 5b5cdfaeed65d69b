//! Foundation types for bundled multi-file uploads.
//!
//! Every other bundl crate depends on `bundl-types`. It owns the rules for
//! slash-separated resource paths (the manifest and the storage gateway both
//! speak them) and the lock modes exchanged with the locking provider.
//!
//! # Key Types
//!
//! - [`split_path`], [`join_path`], [`normalize_path`] - resource path helpers
//! - [`validate_file_name`] - the name rules applied before any write
//! - [`LockMode`] - shared or exclusive lock on a resource path

pub mod error;
pub mod lock;
pub mod path;

pub use error::TypeError;
pub use lock::LockMode;
pub use path::{join_path, normalize_path, split_path, validate_file_name};
