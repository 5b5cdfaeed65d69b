//! Lock lifecycle helpers.
//!
//! [`InMemoryLockProvider`] keeps one [`LockState`] per path behind a
//! `Mutex`. [`LockGuard`] ties a held lock to a scope: it can be upgraded and
//! downgraded while held, and it releases the mode it currently holds when
//! dropped.

use std::collections::HashMap;
use std::sync::Mutex;

use bundl_types::LockMode;
use tracing::debug;

use crate::error::{LockError, LockResult};
use crate::traits::LockProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LockState {
    Shared(usize),
    Exclusive,
}

/// Process-local lock table.
#[derive(Debug, Default)]
pub struct InMemoryLockProvider {
    locks: Mutex<HashMap<String, LockState>>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode and holder count currently held on `path`.
    pub fn held(&self, path: &str) -> Option<(LockMode, usize)> {
        let locks = self.locks.lock().expect("lock table poisoned");
        locks.get(path).map(|state| match state {
            LockState::Shared(n) => (LockMode::Shared, *n),
            LockState::Exclusive => (LockMode::Exclusive, 1),
        })
    }

    /// Returns `true` if no path is locked.
    pub fn is_idle(&self) -> bool {
        self.locks.lock().expect("lock table poisoned").is_empty()
    }
}

impl LockProvider for InMemoryLockProvider {
    fn acquire(&self, path: &str, mode: LockMode) -> LockResult<()> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        match (locks.get(path).copied(), mode) {
            (None, LockMode::Shared) => {
                locks.insert(path.to_string(), LockState::Shared(1));
            }
            (None, LockMode::Exclusive) => {
                locks.insert(path.to_string(), LockState::Exclusive);
            }
            (Some(LockState::Shared(n)), LockMode::Shared) => {
                locks.insert(path.to_string(), LockState::Shared(n + 1));
            }
            _ => return Err(LockError::locked(path, mode)),
        }
        Ok(())
    }

    fn change(&self, path: &str, target: LockMode) -> LockResult<()> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        match (locks.get(path).copied(), target) {
            (Some(LockState::Shared(1)), LockMode::Exclusive) => {
                locks.insert(path.to_string(), LockState::Exclusive);
            }
            (Some(LockState::Exclusive), LockMode::Shared) => {
                locks.insert(path.to_string(), LockState::Shared(1));
            }
            _ => return Err(LockError::locked(path, target)),
        }
        Ok(())
    }

    fn release(&self, path: &str, mode: LockMode) {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        match (locks.get(path).copied(), mode) {
            (Some(LockState::Shared(n)), LockMode::Shared) if n > 1 => {
                locks.insert(path.to_string(), LockState::Shared(n - 1));
            }
            (Some(LockState::Shared(_)), LockMode::Shared)
            | (Some(LockState::Exclusive), LockMode::Exclusive) => {
                locks.remove(path);
            }
            (state, _) => {
                debug!(path, %mode, ?state, "release of a lock that is not held");
            }
        }
    }
}

/// A lock held on one path for the lifetime of the guard.
pub struct LockGuard<'a> {
    provider: &'a dyn LockProvider,
    path: String,
    mode: LockMode,
}

impl<'a> LockGuard<'a> {
    /// Acquire `mode` on `path`, failing immediately on conflict.
    pub fn acquire(provider: &'a dyn LockProvider, path: &str, mode: LockMode) -> LockResult<Self> {
        provider.acquire(path, mode)?;
        Ok(Self { provider, path: path.to_string(), mode })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Convert to an exclusive lock. On failure the guard keeps its mode.
    pub fn upgrade(&mut self) -> LockResult<()> {
        self.change(LockMode::Exclusive)
    }

    /// Convert back to a shared lock. On failure the guard keeps its mode.
    pub fn downgrade(&mut self) -> LockResult<()> {
        self.change(LockMode::Shared)
    }

    fn change(&mut self, target: LockMode) -> LockResult<()> {
        if self.mode == target {
            return Ok(());
        }
        self.provider.change(&self.path, target)?;
        self.mode = target;
        Ok(())
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.provider.release(&self.path, self.mode);
    }
}

impl std::fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}
