//! Revision numbers this client has observed or written, per registry key.
//!
//! Each `(public key, data key)` pair owns its own mutex. Writers take it with
//! a non-blocking try-lock and hold it across upload, signing and submission;
//! a second writer on the same key gets [`SkyDbError::ConcurrentAccess`] instead
//! of queueing behind the first. Readers never wait on writers: they advance
//! the cached revision only if the lock happens to be free.

use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::sync::{Mutex, OwnedMutexGuard};

use skyloom_common::types::crypto::{CryptoError, HASH_LENGTH, PublicKey};
use skyloom_common::types::registry::data_key_bytes;

use crate::error::{Result, SkyDbError};

/// Identity of a cached revision: the owner and the hashed data key.
///
/// A plain data key and its pre-hashed hex form address the same entry.
#[derive(Debug, Clone)]
pub struct RevisionKey {
    public_key: PublicKey,
    hashed_data_key: [u8; HASH_LENGTH],
    data_key: SmolStr,
}

impl RevisionKey {
    /// Build the key for `(public_key, data_key)`.
    pub fn new(
        public_key: PublicKey,
        data_key: &str,
        hashed_data_key_hex: bool,
    ) -> core::result::Result<Self, CryptoError> {
        Ok(Self {
            public_key,
            hashed_data_key: data_key_bytes(data_key, hashed_data_key_hex)?,
            data_key: SmolStr::new(data_key),
        })
    }

    /// Owner of the entry.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Data key as the caller spelled it.
    pub fn data_key(&self) -> &str {
        &self.data_key
    }
}

impl PartialEq for RevisionKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key && self.hashed_data_key == other.hashed_data_key
    }
}

impl Eq for RevisionKey {}

impl Hash for RevisionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.public_key.hash(state);
        self.hashed_data_key.hash(state);
    }
}

/// Last known revision of one key; `None` until a revision is observed or written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachedRevision(Option<u64>);

impl CachedRevision {
    /// The cached revision, if known.
    pub fn get(&self) -> Option<u64> {
        self.0
    }

    /// Revision the next write must use: 0 when unknown, otherwise one more
    /// than the cached value. `None` if the cached value is already the maximum.
    pub fn next(&self) -> Option<u64> {
        match self.0 {
            None => Some(0),
            Some(rev) => rev.checked_add(1),
        }
    }
}

/// Shared handle to one key's cached revision.
pub type CachedRevisionEntry = Arc<Mutex<CachedRevision>>;

/// Exclusive access to one key's cached revision, held for the duration of a write.
pub struct RevisionGuard {
    key: RevisionKey,
    guard: OwnedMutexGuard<CachedRevision>,
}

impl RevisionGuard {
    /// Key this guard locks.
    pub fn key(&self) -> &RevisionKey {
        &self.key
    }

    /// The cached revision, if known.
    pub fn revision(&self) -> Option<u64> {
        self.guard.get()
    }

    /// Revision to use for the next write.
    pub fn next_revision(&self) -> Result<u64> {
        self.guard
            .next()
            .ok_or_else(|| SkyDbError::RevisionOverflow {
                data_key: self.key.data_key.clone(),
            })
    }

    /// Record `revision` as written. Call only once the registry accepted it.
    pub fn commit(&mut self, revision: u64) {
        #[cfg(feature = "tracing")]
        tracing::debug!(data_key = %self.key.data_key, revision, "revision committed");
        *self.guard = CachedRevision(Some(revision));
    }
}

/// Per-client cache of registry revision numbers.
#[derive(Debug, Default)]
pub struct RevisionCache {
    entries: DashMap<RevisionKey, CachedRevisionEntry>,
}

impl RevisionCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a cache slot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key has been touched yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The slot for `key`, created empty on first access.
    pub fn get_or_create(&self, key: &RevisionKey) -> CachedRevisionEntry {
        self.entries.entry(key.clone()).or_default().clone()
    }

    /// Peek at the cached revision for `key`.
    ///
    /// Returns `None` if the key is unknown or a write currently holds its lock.
    pub fn revision(&self, key: &RevisionKey) -> Option<u64> {
        let entry = self.entries.get(key)?.clone();
        let revision = entry.try_lock().ok()?.get();
        revision
    }

    /// Run `f` with exclusive access to the cached revision of `key`.
    ///
    /// Fails immediately with [`SkyDbError::ConcurrentAccess`] if another
    /// operation already holds the lock. The lock is released when the future
    /// returned by `f` completes or is dropped.
    pub async fn with_cached_entry_lock<F, Fut, T>(&self, key: &RevisionKey, f: F) -> Result<T>
    where
        F: FnOnce(RevisionGuard) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let entry = self.get_or_create(key);
        let guard = entry.try_lock_owned().map_err(|_| {
            #[cfg(feature = "tracing")]
            tracing::debug!(data_key = %key.data_key, "write refused: key is locked");
            SkyDbError::ConcurrentAccess {
                data_key: key.data_key.clone(),
            }
        })?;
        f(RevisionGuard {
            key: key.clone(),
            guard,
        })
        .await
    }

    /// Move the cached revision of `key` forward to `observed`.
    ///
    /// Fails with [`SkyDbError::RevisionTooLow`] if the cache already holds a
    /// higher revision. Does nothing while a write holds the key's lock.
    pub fn advance(&self, key: &RevisionKey, observed: u64) -> Result<()> {
        let entry = self.get_or_create(key);
        let Ok(mut cached) = entry.try_lock() else {
            #[cfg(feature = "tracing")]
            tracing::debug!(data_key = %key.data_key, observed, "write in flight, not priming");
            return Ok(());
        };
        match cached.get() {
            Some(current) if current > observed => {
                #[cfg(feature = "tracing")]
                tracing::warn!(data_key = %key.data_key, current, observed, "registry returned a stale revision");
                Err(SkyDbError::RevisionTooLow {
                    cached: current,
                    observed,
                })
            }
            _ => {
                *cached = CachedRevision(Some(observed));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyloom_common::types::crypto::gen_key_pair_from_seed;
    use skyloom_common::types::registry::{MAX_REVISION, hash_data_key};

    fn key(data_key: &str) -> RevisionKey {
        let pk = gen_key_pair_from_seed("revision cache").public_key;
        RevisionKey::new(pk, data_key, false).unwrap()
    }

    #[test]
    fn slots_are_shared_per_key() {
        let cache = RevisionCache::new();
        let a = cache.get_or_create(&key("a"));
        let again = cache.get_or_create(&key("a"));
        let b = cache.get_or_create(&key("b"));
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn prehashed_key_shares_slot() {
        let pk = gen_key_pair_from_seed("revision cache").public_key;
        let hashed = hex::encode(hash_data_key("a"));
        let prehashed = RevisionKey::new(pk, &hashed, true).unwrap();
        assert_eq!(prehashed, key("a"));

        let cache = RevisionCache::new();
        cache.advance(&key("a"), 4).unwrap();
        assert_eq!(cache.revision(&prehashed), Some(4));
    }

    #[test]
    fn unknown_revision_starts_at_zero() {
        assert_eq!(CachedRevision::default().next(), Some(0));
        assert_eq!(CachedRevision(Some(41)).next(), Some(42));
        assert_eq!(CachedRevision(Some(MAX_REVISION)).next(), None);
    }

    #[tokio::test]
    async fn commit_advances_revision() {
        let cache = RevisionCache::new();
        let k = key("commit");
        let written = cache
            .with_cached_entry_lock(&k, |mut guard| async move {
                let next = guard.next_revision()?;
                guard.commit(next);
                Ok(next)
            })
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(cache.revision(&k), Some(0));
    }

    #[tokio::test]
    async fn failed_write_leaves_revision_untouched() {
        let cache = RevisionCache::new();
        let k = key("fail");
        cache.advance(&k, 7).unwrap();
        let err = cache
            .with_cached_entry_lock(&k, |guard| async move {
                let _next = guard.next_revision()?;
                Err::<(), _>(SkyDbError::DataFormat("upload failed".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SkyDbError::DataFormat(_)));
        assert_eq!(cache.revision(&k), Some(7));
    }

    #[tokio::test]
    async fn second_writer_fails_fast() {
        let cache = RevisionCache::new();
        let k = key("busy");
        let other = key("other");
        let (c, busy, other) = (&cache, &k, &other);
        cache
            .with_cached_entry_lock(busy, |guard| async move {
                let _held = guard;
                let err = c
                    .with_cached_entry_lock(busy, |_| async { Ok(()) })
                    .await
                    .unwrap_err();
                assert!(
                    matches!(&err, SkyDbError::ConcurrentAccess { data_key } if data_key == "busy")
                );

                // Unrelated keys are not blocked.
                c.with_cached_entry_lock(other, |_| async { Ok(()) }).await?;

                // Reads do not wait either, and skip priming.
                c.advance(busy, 99)?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(cache.revision(&k), None);

        // Lock is released afterwards.
        cache
            .with_cached_entry_lock(&k, |_| async { Ok(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn overflow_is_reported_inside_lock() {
        let cache = RevisionCache::new();
        let k = key("frozen");
        cache.advance(&k, MAX_REVISION).unwrap();
        let err = cache
            .with_cached_entry_lock(&k, |guard| async move { guard.next_revision() })
            .await
            .unwrap_err();
        assert!(matches!(err, SkyDbError::RevisionOverflow { .. }));
        assert_eq!(cache.revision(&k), Some(MAX_REVISION));
    }

    #[test]
    fn advance_only_moves_forward() {
        let cache = RevisionCache::new();
        let k = key("forward");
        cache.advance(&k, 3).unwrap();
        cache.advance(&k, 3).unwrap();
        cache.advance(&k, 5).unwrap();
        let err = cache.advance(&k, 4).unwrap_err();
        assert!(matches!(
            err,
            SkyDbError::RevisionTooLow {
                cached: 5,
                observed: 4
            }
        ));
        assert_eq!(cache.revision(&k), Some(5));
    }
}
