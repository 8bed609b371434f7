use skyloom_common::types::crypto::{PrivateKey, PublicKey};
use skyloom_common::types::registry::SignedRegistryEntry;
use skyloom_common::types::skylink::Skylink;

use super::backend::{Payload, RecordBackend};
use super::submit;
use crate::client::BlobStore;
use crate::error::{Result, SkyDbError};
use crate::registry::{GetEntryOptions, RegistryClient, SetEntryOptions};

/// SkyDB store that looks up the current revision before every write.
///
/// Keeps no state between calls. Concurrent writers on one key can compute
/// the same revision; the portal accepts one and rejects the rest. Use
/// [`SkyDbV2`](super::SkyDbV2) unless you need this behavior.
pub struct SkyDb<P> {
    portal: P,
}

impl<P> SkyDb<P>
where
    P: BlobStore + RegistryClient + Sync,
{
    /// Store over `portal`.
    pub fn new(portal: P) -> Self {
        Self { portal }
    }

    /// The underlying portal client.
    pub fn portal(&self) -> &P {
        &self.portal
    }

    async fn next_revision(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        hashed_data_key_hex: bool,
    ) -> Result<u64> {
        let opts = GetEntryOptions {
            hashed_data_key_hex,
            timeout_secs: None,
        };
        let current = self
            .portal
            .get_entry(&private_key.public_key(), data_key, opts)
            .await?;
        match current {
            None => Ok(0),
            Some(signed) => {
                signed
                    .entry
                    .revision
                    .checked_add(1)
                    .ok_or_else(|| SkyDbError::RevisionOverflow {
                        data_key: data_key.into(),
                    })
            }
        }
    }
}

impl<P> RecordBackend for SkyDb<P>
where
    P: BlobStore + RegistryClient + Sync,
{
    type Portal = P;

    fn portal(&self) -> &P {
        &self.portal
    }

    fn observe(
        &self,
        _public_key: &PublicKey,
        _data_key: &str,
        _hashed_data_key_hex: bool,
        _signed: &SignedRegistryEntry,
    ) -> Result<()> {
        Ok(())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, private_key, payload, opts)))]
    async fn write(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        payload: Payload,
        opts: SetEntryOptions,
    ) -> Result<Option<Skylink>> {
        let revision = self
            .next_revision(private_key, data_key, opts.hashed_data_key_hex)
            .await?;
        submit(&self.portal, private_key, data_key, payload, revision, opts).await
    }
}
