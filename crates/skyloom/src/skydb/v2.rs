use skyloom_common::types::crypto::{PrivateKey, PublicKey};
use skyloom_common::types::registry::SignedRegistryEntry;
use skyloom_common::types::skylink::Skylink;

use super::backend::{Payload, RecordBackend};
use super::submit;
use crate::client::BlobStore;
use crate::error::Result;
use crate::registry::{RegistryClient, SetEntryOptions};
use crate::revision_cache::{RevisionCache, RevisionKey};

/// SkyDB store that tracks revisions locally.
///
/// Writes to one key are serialized through the store's
/// [`RevisionCache`]: while a write is in flight, other writes to the same key
/// fail with [`SkyDbError::ConcurrentAccess`](crate::error::SkyDbError::ConcurrentAccess).
/// The cached revision only changes after the portal accepts a write, or when
/// a read observes a newer one.
///
/// Two stores never share a cache, even over the same portal and keys.
pub struct SkyDbV2<P> {
    portal: P,
    revisions: RevisionCache,
}

impl<P> SkyDbV2<P>
where
    P: BlobStore + RegistryClient + Sync,
{
    /// Store over `portal` with an empty revision cache.
    pub fn new(portal: P) -> Self {
        Self {
            portal,
            revisions: RevisionCache::new(),
        }
    }

    /// The underlying portal client.
    pub fn portal(&self) -> &P {
        &self.portal
    }

    /// This store's revision cache.
    pub fn revision_cache(&self) -> &RevisionCache {
        &self.revisions
    }
}

impl<P> RecordBackend for SkyDbV2<P>
where
    P: BlobStore + RegistryClient + Sync,
{
    type Portal = P;

    fn portal(&self) -> &P {
        &self.portal
    }

    /// Move the cached revision forward to what the read saw.
    fn observe(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        hashed_data_key_hex: bool,
        signed: &SignedRegistryEntry,
    ) -> Result<()> {
        let key = RevisionKey::new(*public_key, data_key, hashed_data_key_hex)?;
        self.revisions.advance(&key, signed.entry.revision)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, private_key, payload, opts)))]
    async fn write(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        payload: Payload,
        opts: SetEntryOptions,
    ) -> Result<Option<Skylink>> {
        let key = RevisionKey::new(private_key.public_key(), data_key, opts.hashed_data_key_hex)?;
        self.revisions
            .with_cached_entry_lock(&key, |mut guard| async move {
                let revision = guard.next_revision()?;
                let skylink =
                    submit(&self.portal, private_key, data_key, payload, revision, opts).await?;
                guard.commit(revision);
                Ok(skylink)
            })
            .await
    }
}
