//! Registry entries: small, signed, versioned records addressed by
//! `(public key, data key)`.
//!
//! The signable digest of an entry is
//! `blake2b(hash(data key) ‖ u64le(len(data)) ‖ data ‖ u64le(revision))`, where
//! `hash(data key)` is itself `blake2b(u64le(len(key)) ‖ key)`.

use smol_str::SmolStr;

use crate::types::crypto::{CryptoError, HASH_LENGTH, PrivateKey, PublicKey, Signature, hash_all};
use crate::types::encoding::{encode_prefixed_bytes, encode_u64, encode_utf8_string};
use crate::types::skylink::RAW_SKYLINK_SIZE;

/// Maximum length in bytes of a registry entry's data.
pub const MAX_ENTRY_LENGTH: usize = 70;

/// Highest revision a registry entry can hold; an entry at this revision can
/// never be updated again.
pub const MAX_REVISION: u64 = u64::MAX;

/// Entry data that marks an entry as deleted: an all-zero raw skylink.
pub const DELETION_ENTRY_DATA: [u8; RAW_SKYLINK_SIZE] = [0; RAW_SKYLINK_SIZE];

/// Hash a data key as the registry addresses it.
pub fn hash_data_key(data_key: &str) -> [u8; HASH_LENGTH] {
    hash_all([encode_utf8_string(data_key)])
}

/// Resolve a data key to the 32 bytes the registry addresses it by.
///
/// When `hashed_data_key_hex` is set the caller has already hashed the key and
/// passes it hex-encoded; it is decoded verbatim.
pub fn data_key_bytes(
    data_key: &str,
    hashed_data_key_hex: bool,
) -> Result<[u8; HASH_LENGTH], CryptoError> {
    if !hashed_data_key_hex {
        return Ok(hash_data_key(data_key));
    }
    let bytes = hex::decode(data_key).map_err(|e| CryptoError::Hex {
        what: "hashed data key",
        reason: e.to_string(),
    })?;
    let got = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        what: "hashed data key",
        expected: HASH_LENGTH,
        got,
    })
}

/// Whether `data` is the deletion sentinel.
pub fn is_deletion_entry_data(data: &[u8]) -> bool {
    data == DELETION_ENTRY_DATA
}

/// An unsigned registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Key of the entry within its owner's namespace
    pub data_key: SmolStr,
    /// Entry payload, at most [`MAX_ENTRY_LENGTH`] bytes
    pub data: Vec<u8>,
    /// Revision number
    pub revision: u64,
}

impl RegistryEntry {
    /// Create an entry.
    pub fn new(data_key: impl Into<SmolStr>, data: impl Into<Vec<u8>>, revision: u64) -> Self {
        Self {
            data_key: data_key.into(),
            data: data.into(),
            revision,
        }
    }

    /// Compute the digest that gets signed for this entry.
    pub fn hash(&self, hashed_data_key_hex: bool) -> Result<[u8; HASH_LENGTH], CryptoError> {
        let data_key = data_key_bytes(&self.data_key, hashed_data_key_hex)?;
        Ok(hash_all([
            data_key.as_slice(),
            &encode_prefixed_bytes(&self.data),
            &encode_u64(self.revision),
        ]))
    }

    /// Hash and sign this entry.
    pub fn sign(
        self,
        private_key: &PrivateKey,
        hashed_data_key_hex: bool,
    ) -> Result<SignedRegistryEntry, CryptoError> {
        let digest = self.hash(hashed_data_key_hex)?;
        let signature = private_key.sign(&digest);
        Ok(SignedRegistryEntry {
            entry: self,
            signature,
        })
    }
}

/// A registry entry together with its owner's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRegistryEntry {
    /// The entry
    pub entry: RegistryEntry,
    /// Signature over [`RegistryEntry::hash`]
    pub signature: Signature,
}

impl SignedRegistryEntry {
    /// Check the signature against the entry's owner.
    pub fn verify(
        &self,
        public_key: &PublicKey,
        hashed_data_key_hex: bool,
    ) -> Result<(), CryptoError> {
        let digest = self.entry.hash(hashed_data_key_hex)?;
        public_key.verify(&digest, &self.signature)
    }
}
