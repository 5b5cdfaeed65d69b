//! Storage gateway over a local directory.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, UNIX_EPOCH};

use bundl_types::normalize_path;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{NodeKind, StorageGateway};

/// A [`StorageGateway`] rooted at a directory on the local filesystem.
///
/// Etags are derived from size and modification time and cached until the
/// next [`refresh`](StorageGateway::refresh). File ids are derived from the
/// relative path, so they survive restarts but not renames.
#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
    part_files: bool,
    etags: RwLock<HashMap<String, String>>,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            part_files: true,
            etags: RwLock::new(HashMap::new()),
        }
    }

    /// Whether writes should be staged through part files (default `true`).
    pub fn with_part_files(mut self, part_files: bool) -> Self {
        self.part_files = part_files;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StoreResult<(String, PathBuf)> {
        if !self.root.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "storage root {} is not a directory",
                self.root.display()
            )));
        }
        let rel = normalize_path(path)?;
        let full = if rel.is_empty() { self.root.clone() } else { self.root.join(&rel) };
        Ok((rel, full))
    }

    fn compute_etag(meta: &fs::Metadata) -> String {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(&meta.len().to_le_bytes());
        hasher.update(&mtime.to_le_bytes());
        hex::encode(&hasher.finalize().as_bytes()[..8])
    }
}

fn map_io(err: io::Error, rel: &str) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(rel.to_string()),
        io::ErrorKind::PermissionDenied => StoreError::Forbidden(rel.to_string()),
        _ => StoreError::Io(err),
    }
}

impl StorageGateway for FsStorage {
    fn node_kind(&self, path: &str) -> StoreResult<Option<NodeKind>> {
        let (rel, full) = self.resolve(path)?;
        match fs::metadata(&full) {
            Ok(meta) if meta.is_dir() => Ok(Some(NodeKind::Directory)),
            Ok(_) => Ok(Some(NodeKind::File)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(e, &rel)),
        }
    }

    fn is_creatable(&self, folder: &str) -> StoreResult<bool> {
        let (rel, full) = self.resolve(folder)?;
        match fs::metadata(&full) {
            Ok(meta) => Ok(meta.is_dir() && !meta.permissions().readonly()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(e, &rel)),
        }
    }

    fn needs_part_file(&self, _path: &str) -> bool {
        self.part_files
    }

    fn free_space(&self, _folder: &str) -> StoreResult<Option<u64>> {
        Ok(None)
    }

    fn open_write(&self, path: &str) -> StoreResult<Box<dyn Write + '_>> {
        let (rel, full) = self.resolve(path)?;
        let file = File::create(&full).map_err(|e| map_io(e, &rel))?;
        Ok(Box::new(file))
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        let (rel, full) = self.resolve(path)?;
        self.etags.write().expect("etag cache poisoned").remove(&rel);
        match fs::remove_file(&full) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(e, &rel)),
        }
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<bool> {
        let (from_rel, from_full) = self.resolve(from)?;
        let (to_rel, to_full) = self.resolve(to)?;
        fs::rename(&from_full, &to_full).map_err(|e| map_io(e, &from_rel))?;
        let mut etags = self.etags.write().expect("etag cache poisoned");
        etags.remove(&from_rel);
        etags.remove(&to_rel);
        Ok(true)
    }

    fn refresh(&self, path: &str) -> StoreResult<()> {
        let (rel, full) = self.resolve(path)?;
        let meta = fs::metadata(&full).map_err(|e| map_io(e, &rel))?;
        let etag = Self::compute_etag(&meta);
        debug!(path = %rel, %etag, "refreshed metadata");
        self.etags.write().expect("etag cache poisoned").insert(rel, etag);
        Ok(())
    }

    fn touch(&self, path: &str, mtime: i64) -> StoreResult<bool> {
        let (rel, full) = self.resolve(path)?;
        let time = if mtime >= 0 {
            UNIX_EPOCH + Duration::from_secs(mtime.unsigned_abs())
        } else {
            UNIX_EPOCH - Duration::from_secs(mtime.unsigned_abs())
        };
        let file = File::options().write(true).open(&full).map_err(|e| map_io(e, &rel))?;
        file.set_modified(time)?;
        drop(file);
        self.refresh(&rel)?;
        Ok(true)
    }

    fn etag(&self, path: &str) -> StoreResult<String> {
        let (rel, full) = self.resolve(path)?;
        if let Some(etag) = self.etags.read().expect("etag cache poisoned").get(&rel) {
            return Ok(etag.clone());
        }
        let meta = fs::metadata(&full).map_err(|e| map_io(e, &rel))?;
        Ok(Self::compute_etag(&meta))
    }

    fn file_id(&self, path: &str) -> StoreResult<String> {
        let (rel, full) = self.resolve(path)?;
        if !full.is_file() {
            return Err(StoreError::NotFound(rel));
        }
        Ok(hex::encode(&blake3::hash(rel.as_bytes()).as_bytes()[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsStorage) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorage::new(dir.path());
        (dir, store)
    }

    #[test]
    fn root_is_a_directory() {
        let (_dir, store) = store();
        assert_eq!(store.node_kind("").unwrap(), Some(NodeKind::Directory));
        assert!(store.is_creatable("").unwrap());
    }

    #[test]
    fn missing_root_is_unavailable() {
        let store = FsStorage::new("/definitely/not/here/bundl");
        assert!(matches!(store.node_kind(""), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn write_rename_and_refresh() {
        let (dir, store) = store();
        {
            let mut w = store.open_write("a.part").unwrap();
            w.write_all(b"hello").unwrap();
        }
        assert!(store.rename("a.part", "a.txt").unwrap());
        store.refresh("a.txt").unwrap();
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hello");
        assert!(store.file_exists("a.txt").unwrap());
        assert!(!store.file_exists("a.part").unwrap());
        assert_eq!(store.etag("a.txt").unwrap().len(), 16);
    }

    #[test]
    fn touch_sets_mtime() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        assert!(store.touch("a.txt", 1_500_000_000).unwrap());
        let meta = fs::metadata(dir.path().join("a.txt")).unwrap();
        let secs = meta.modified().unwrap().duration_since(UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs, 1_500_000_000);
    }

    #[test]
    fn file_id_is_stable() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        assert_eq!(store.file_id("a.txt").unwrap(), store.file_id("/a.txt").unwrap());
        assert!(matches!(store.file_id("b.txt"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn remove_reports_existence() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        assert!(store.remove("a.txt").unwrap());
        assert!(!store.remove("a.txt").unwrap());
    }

    #[test]
    fn parent_escape_rejected() {
        let (_dir, store) = store();
        assert!(matches!(store.node_kind("../etc"), Err(StoreError::InvalidPath(_))));
    }
}
