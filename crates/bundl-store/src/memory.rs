use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{self, Write};
use std::sync::RwLock;

use bundl_types::{normalize_path, split_path};

use crate::error::{StoreError, StoreResult};
use crate::traits::{NodeKind, StorageGateway};

#[derive(Clone, Debug)]
struct MemFile {
    data: Vec<u8>,
    mtime: i64,
    etag: String,
    id: u64,
}

#[derive(Debug, Default)]
struct Inner {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, MemFile>,
    read_only: HashSet<String>,
    refreshed: Vec<String>,
    next_id: u64,
    clock: i64,
    quota: Option<u64>,
    write_limit: Option<u64>,
    unavailable: bool,
    fail_renames: bool,
    fail_refresh: bool,
}

impl Inner {
    fn used_bytes(&self) -> u64 {
        self.files.values().map(|f| f.data.len() as u64).sum()
    }

    fn compute_etag(path: &str, file: &MemFile) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(path.as_bytes());
        hasher.update(&file.mtime.to_le_bytes());
        hasher.update(&file.data);
        hex::encode(&hasher.finalize().as_bytes()[..8])
    }
}

/// In-memory, map-based storage gateway.
///
/// Intended for tests and embedding. Besides plain storage it can simulate a
/// quota, a read-only folder, an unreachable backend, writes that break after
/// a number of bytes and renames that fail, so every failure path of the
/// upload pipeline can be driven deterministically.
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
    part_files: bool,
}

impl InMemoryStorage {
    /// Create an empty store containing only the root directory.
    pub fn new() -> Self {
        let mut inner = Inner { next_id: 1, clock: 1_000, ..Default::default() };
        inner.dirs.insert(String::new());
        Self { inner: RwLock::new(inner), part_files: true }
    }

    /// Whether writes should be staged through part files (default `true`).
    pub fn with_part_files(mut self, part_files: bool) -> Self {
        self.part_files = part_files;
        self
    }

    /// Create a directory and all its ancestors.
    pub fn mkdir(&self, path: &str) -> StoreResult<()> {
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            inner.dirs.insert(current.clone());
        }
        Ok(())
    }

    /// Create or replace a file directly, bypassing the write path.
    pub fn put_file(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let mut writer = self.open_write(path)?;
        writer.write_all(data)?;
        drop(writer);
        self.refresh(path)
    }

    /// Content of the file at `path`.
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let path = normalize_path(path).ok()?;
        let inner = self.inner.read().expect("lock poisoned");
        inner.files.get(&path).map(|f| f.data.clone())
    }

    /// Modification time of the file at `path`.
    pub fn mtime(&self, path: &str) -> Option<i64> {
        let path = normalize_path(path).ok()?;
        let inner = self.inner.read().expect("lock poisoned");
        inner.files.get(&path).map(|f| f.mtime)
    }

    /// Sorted list of all file paths.
    pub fn file_paths(&self) -> Vec<String> {
        self.inner.read().expect("lock poisoned").files.keys().cloned().collect()
    }

    /// Paths passed to [`StorageGateway::refresh`], in call order.
    pub fn refreshed(&self) -> Vec<String> {
        self.inner.read().expect("lock poisoned").refreshed.clone()
    }

    /// Forbid creating entries inside `folder`.
    pub fn deny_create(&self, folder: &str) -> StoreResult<()> {
        let folder = normalize_path(folder)?;
        self.inner.write().expect("lock poisoned").read_only.insert(folder);
        Ok(())
    }

    /// Limit the total number of stored bytes.
    pub fn set_quota(&self, quota: Option<u64>) {
        self.inner.write().expect("lock poisoned").quota = quota;
    }

    /// Make every write fail once a writer has accepted `limit` bytes.
    pub fn set_write_limit(&self, limit: Option<u64>) {
        self.inner.write().expect("lock poisoned").write_limit = limit;
    }

    /// Simulate an unreachable backend.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().expect("lock poisoned").unavailable = unavailable;
    }

    /// Make every rename report failure.
    pub fn set_fail_renames(&self, fail: bool) {
        self.inner.write().expect("lock poisoned").fail_renames = fail;
    }

    /// Make every metadata refresh fail as if the backend went away.
    pub fn set_fail_refresh(&self, fail: bool) {
        self.inner.write().expect("lock poisoned").fail_refresh = fail;
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.inner.read().expect("lock poisoned").unavailable {
            return Err(StoreError::Unavailable("in-memory backend switched off".into()));
        }
        Ok(())
    }

    fn require_parent(inner: &Inner, path: &str) -> StoreResult<()> {
        let (folder, _) = split_path(path);
        if !inner.dirs.contains(folder) {
            return Err(StoreError::NotFound(folder.to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer appending straight into the file map.
struct MemWriter<'a> {
    store: &'a InMemoryStorage,
    path: String,
    written: u64,
}

impl Write for MemWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.store.inner.write().expect("lock poisoned");
        if let Some(limit) = inner.write_limit {
            if self.written + buf.len() as u64 > limit {
                return Err(io::Error::new(io::ErrorKind::Other, "simulated write failure"));
            }
        }
        if let Some(quota) = inner.quota {
            if inner.used_bytes() + buf.len() as u64 > quota {
                return Err(io::Error::new(io::ErrorKind::Other, "quota exceeded"));
            }
        }
        let file = inner
            .files
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file removed while writing"))?;
        file.data.extend_from_slice(buf);
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageGateway for InMemoryStorage {
    fn node_kind(&self, path: &str) -> StoreResult<Option<NodeKind>> {
        self.check_available()?;
        let path = normalize_path(path)?;
        let inner = self.inner.read().expect("lock poisoned");
        if inner.dirs.contains(&path) {
            Ok(Some(NodeKind::Directory))
        } else if inner.files.contains_key(&path) {
            Ok(Some(NodeKind::File))
        } else {
            Ok(None)
        }
    }

    fn is_creatable(&self, folder: &str) -> StoreResult<bool> {
        self.check_available()?;
        let folder = normalize_path(folder)?;
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.dirs.contains(&folder) && !inner.read_only.contains(&folder))
    }

    fn needs_part_file(&self, _path: &str) -> bool {
        self.part_files
    }

    fn free_space(&self, _folder: &str) -> StoreResult<Option<u64>> {
        self.check_available()?;
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.quota.map(|q| q.saturating_sub(inner.used_bytes())))
    }

    fn open_write(&self, path: &str) -> StoreResult<Box<dyn Write + '_>> {
        self.check_available()?;
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        Self::require_parent(&inner, &path)?;
        if inner.dirs.contains(&path) {
            return Err(StoreError::Forbidden(format!("{path} is a directory")));
        }
        let existing = inner.files.get(&path).map(|f| f.id);
        let id = match existing {
            Some(id) => id,
            None => {
                inner.next_id += 1;
                inner.next_id - 1
            }
        };
        inner.clock += 1;
        let mtime = inner.clock;
        inner.files.insert(
            path.clone(),
            MemFile { data: Vec::new(), mtime, etag: String::new(), id },
        );
        Ok(Box::new(MemWriter { store: self, path, written: 0 }))
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        self.check_available()?;
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        Ok(inner.files.remove(&path).is_some())
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<bool> {
        self.check_available()?;
        let from = normalize_path(from)?;
        let to = normalize_path(to)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        if inner.fail_renames {
            return Ok(false);
        }
        Self::require_parent(&inner, &to)?;
        match inner.files.remove(&from) {
            Some(file) => {
                inner.files.insert(to, file);
                Ok(true)
            }
            None => Err(StoreError::NotFound(from)),
        }
    }

    fn refresh(&self, path: &str) -> StoreResult<()> {
        self.check_available()?;
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        if inner.fail_refresh {
            return Err(StoreError::Unavailable("simulated refresh failure".into()));
        }
        let file = inner.files.get_mut(&path).ok_or_else(|| StoreError::NotFound(path.clone()))?;
        file.etag = Inner::compute_etag(&path, file);
        inner.refreshed.push(path);
        Ok(())
    }

    fn touch(&self, path: &str, mtime: i64) -> StoreResult<bool> {
        self.check_available()?;
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        let file = inner.files.get_mut(&path).ok_or_else(|| StoreError::NotFound(path.clone()))?;
        file.mtime = mtime;
        file.etag = Inner::compute_etag(&path, file);
        Ok(true)
    }

    fn etag(&self, path: &str) -> StoreResult<String> {
        self.check_available()?;
        let path = normalize_path(path)?;
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .files
            .get(&path)
            .map(|f| f.etag.clone())
            .ok_or(StoreError::NotFound(path))
    }

    fn file_id(&self, path: &str) -> StoreResult<String> {
        self.check_available()?;
        let path = normalize_path(path)?;
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .files
            .get(&path)
            .map(|f| format!("{:08}", f.id))
            .ok_or(StoreError::NotFound(path))
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryStorage")
            .field("dirs", &inner.dirs.len())
            .field("files", &inner.files.len())
            .field("part_files", &self.part_files)
            .finish()
    }
}
