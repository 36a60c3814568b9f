//! Hash-addressed work folders.
//!
//! Layout: `<root>/<first 2 hex chars>/<remaining 62 hex chars>/`.
//!
//! A folder is claimed with `create_dir` on the leaf, which fails if the
//! folder already exists. Nothing is ever overwritten: when the folder for
//! a key is taken, the next key on the attempt chain is tried instead.

use crate::error::{StorageError, StorageResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use strata_core::CacheKey;
use tokio::sync::OwnedMutexGuard;

/// Upper bound on folders tried along one key's attempt chain
pub const MAX_ATTEMPTS: u32 = 1024;

/// A work folder on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFolder {
    /// Base cache key of the task run
    pub key: CacheKey,
    /// Position on the attempt chain
    pub attempt: u32,
    /// Absolute or root-relative folder path
    pub path: PathBuf,
}

impl WorkFolder {
    /// Folder path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Maps cache keys to work folders under a root directory
#[derive(Debug, Clone)]
pub struct FolderAllocator {
    root: PathBuf,
}

impl FolderAllocator {
    /// Create an allocator rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Work directory root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the folder addressed by `key`
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Existing folders along the attempt chain of `key`, in order.
    ///
    /// Stops at the first attempt whose folder does not exist.
    #[must_use]
    pub fn existing(&self, key: &CacheKey) -> Vec<WorkFolder> {
        let mut found = Vec::new();
        for attempt in 0..MAX_ATTEMPTS {
            let path = self.path_for(&key.attempt(attempt));
            if !path.is_dir() {
                break;
            }
            found.push(WorkFolder {
                key: *key,
                attempt,
                path,
            });
        }
        found
    }

    /// Create a fresh folder for `key`.
    ///
    /// Walks the attempt chain and claims the first folder that does not
    /// exist yet.
    ///
    /// # Errors
    ///
    /// Returns error if directory creation fails or the chain is exhausted
    pub fn claim(&self, key: &CacheKey) -> StorageResult<WorkFolder> {
        for attempt in 0..MAX_ATTEMPTS {
            let path = self.path_for(&key.attempt(attempt));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }

            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!(key = %key.short(), attempt, path = %path.display(), "claimed work folder");
                    return Ok(WorkFolder {
                        key: *key,
                        attempt,
                        path,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }

        Err(StorageError::AttemptsExhausted {
            key: key.to_hex(),
            attempts: MAX_ATTEMPTS,
        })
    }
}

type LockMap = Arc<Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>>;

/// In-process exclusive locks per cache key.
///
/// Serializes cache lookup and execution for identical keys so that two
/// identical task runs in one process execute once.
#[derive(Debug, Clone, Default)]
pub struct KeyLocks {
    locks: LockMap,
}

impl KeyLocks {
    /// Create an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: CacheKey) -> KeyGuard {
        let mutex = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key).or_default())
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            key,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of keys with a live lock entry
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no key is locked or awaited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while a key is locked; releases on drop
#[derive(Debug)]
pub struct KeyGuard {
    key: CacheKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table itself still references the mutex: no waiters.
        if map.get(&self.key).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Hash, SessionId, Value};

    fn test_key(tag: &str) -> CacheKey {
        let value = Value::from(tag);
        CacheKey::compute(SessionId::from_bytes([3u8; 16]), "echo", [("tag", &value)]).unwrap()
    }

    #[test]
    fn test_path_layout() {
        let alloc = FolderAllocator::new("/work");
        let key = CacheKey::from_hash(Hash::from_bytes([0x5a; 32]));
        let path = alloc.path_for(&key);

        let hex = key.to_hex();
        assert_eq!(path, PathBuf::from("/work").join("5a").join(&hex[2..]));
        assert_eq!(path.file_name().unwrap().len(), 62);
    }

    #[test]
    fn test_claim_creates_keyed_folder() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = FolderAllocator::new(dir.path());
        let key = test_key("a");

        let folder = alloc.claim(&key).unwrap();
        assert_eq!(folder.attempt, 0);
        assert_eq!(folder.path, alloc.path_for(&key));
        assert!(folder.path.is_dir());
    }

    #[test]
    fn test_claim_never_reuses_existing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = FolderAllocator::new(dir.path());
        let key = test_key("a");

        let first = alloc.claim(&key).unwrap();
        std::fs::write(first.path.join("keep.txt"), "x").unwrap();

        let second = alloc.claim(&key).unwrap();
        assert_eq!(second.attempt, 1);
        assert_ne!(first.path, second.path);
        assert!(first.path.join("keep.txt").exists());
        assert_eq!(second.path, alloc.path_for(&key.attempt(1)));
    }

    #[test]
    fn test_existing_walks_chain() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = FolderAllocator::new(dir.path());
        let key = test_key("b");

        assert!(alloc.existing(&key).is_empty());
        alloc.claim(&key).unwrap();
        alloc.claim(&key).unwrap();

        let existing = alloc.existing(&key);
        assert_eq!(existing.len(), 2);
        assert_eq!(existing[0].attempt, 0);
        assert_eq!(existing[1].attempt, 1);
    }

    #[test]
    fn test_concurrent_claims_get_distinct_folders() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = FolderAllocator::new(dir.path());
        let key = test_key("c");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = alloc.clone();
                std::thread::spawn(move || alloc.claim(&key).unwrap().path)
            })
            .collect();
        let mut paths: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    #[tokio::test]
    async fn test_key_locks_serialize_same_key() {
        let locks = KeyLocks::new();
        let key = test_key("d");

        let guard = locks.lock(key).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(key).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_key_locks_independent_keys() {
        let locks = KeyLocks::new();
        let _a = locks.lock(test_key("a")).await;
        let _b = locks.lock(test_key("b")).await;
        assert_eq!(locks.len(), 2);
    }
}
