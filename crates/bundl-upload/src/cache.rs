use std::collections::HashMap;

use bundl_store::StoreResult;

/// Memo of "folder exists and accepts new files", scoped to one request.
///
/// Only definite answers are stored. A lookup that fails with an error is not
/// cached, so the next entry in the same folder asks the storage again.
#[derive(Debug, Default)]
pub struct ParentValidityCache {
    entries: HashMap<String, bool>,
}

impl ParentValidityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, folder: &str) -> Option<bool> {
        self.entries.get(folder).copied()
    }

    /// Cached answer for `folder`, running `lookup` on a miss.
    pub fn check<F>(&mut self, folder: &str, lookup: F) -> StoreResult<bool>
    where
        F: FnOnce() -> StoreResult<bool>,
    {
        if let Some(valid) = self.get(folder) {
            return Ok(valid);
        }
        let valid = lookup()?;
        self.entries.insert(folder.to_string(), valid);
        Ok(valid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundl_store::StoreError;
    use std::cell::Cell;

    #[test]
    fn looks_up_once_per_folder() {
        let mut cache = ParentValidityCache::new();
        let calls = Cell::new(0);
        for _ in 0..3 {
            let valid = cache
                .check("docs", || {
                    calls.set(calls.get() + 1);
                    Ok(true)
                })
                .unwrap();
            assert!(valid);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.get("docs"), Some(true));
    }

    #[test]
    fn negative_answers_are_cached() {
        let mut cache = ParentValidityCache::new();
        assert!(!cache.check("x", || Ok(false)).unwrap());
        assert!(!cache.check("x", || panic!("must not look up again")).unwrap());
    }

    #[test]
    fn errors_are_not_cached() {
        let mut cache = ParentValidityCache::new();
        assert!(cache.check("x", || Err(StoreError::Unavailable("down".into()))).is_err());
        assert!(cache.is_empty());
        assert!(cache.check("x", || Ok(true)).unwrap());
    }
}
