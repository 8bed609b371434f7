//! Errors surfaced by the portal client and SkyDB.

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use skyloom_common::error::{ClientError, TransportError};
use skyloom_common::types::crypto::CryptoError;
use skyloom_common::types::skylink::SkylinkError;

/// Errors from registry, blob store and SkyDB operations.
///
/// A registry lookup that finds nothing is not an error; it comes back as
/// `None` (or as empty [`JsonData`](crate::skydb::JsonData)).
#[derive(Debug, Error, Diagnostic)]
pub enum SkyDbError {
    /// Skylink text did not decode to exactly 34 bytes
    #[error(transparent)]
    #[diagnostic(transparent)]
    IncorrectSize(#[from] SkylinkError),

    /// The entry is at the maximum revision and can never be written again
    #[error("revision for '{data_key}' is already at the maximum and cannot be incremented")]
    #[diagnostic(
        code(skyloom::skydb::revision_overflow),
        help("this data key is permanently frozen; write under a new data key")
    )]
    RevisionOverflow {
        /// Data key of the frozen entry
        data_key: SmolStr,
    },

    /// Another write to the same key is already in flight on this client
    #[error("concurrent access to '{data_key}': a write for this key is already in progress")]
    #[diagnostic(
        code(skyloom::skydb::concurrent_access),
        help("wait for the in-flight write to finish, then retry")
    )]
    ConcurrentAccess {
        /// Data key being written
        data_key: SmolStr,
    },

    /// A read observed an older revision than this client already knows about
    #[error("registry returned revision {observed}, lower than the cached revision {cached}")]
    #[diagnostic(
        code(skyloom::skydb::revision_too_low),
        help("a newer write raced with this read; read again")
    )]
    RevisionTooLow {
        /// Revision held in the cache
        cached: u64,
        /// Revision the registry returned
        observed: u64,
    },

    /// The stored blob is not a SkyDB JSON document
    #[error("data format error: {0}")]
    #[diagnostic(code(skyloom::skydb::data_format))]
    DataFormat(String),

    /// The portal refused a registry write
    #[error("registry rejected the entry (HTTP {status}): {body}")]
    #[diagnostic(
        code(skyloom::registry::rejected),
        help("a 400 usually means the revision is not higher than the one stored")
    )]
    RegistryRejected {
        /// Response status
        status: http::StatusCode,
        /// Response body, lossily decoded
        body: String,
    },

    /// Attempted to write the deletion sentinel through a regular setter
    #[error("entry data is the reserved deletion value")]
    #[diagnostic(
        code(skyloom::skydb::deletion_sentinel),
        help("use delete_entry_data or delete_json to delete an entry")
    )]
    DeletionSentinel,

    /// Entry data exceeds the registry limit
    #[error("entry data is {len} bytes, more than the registry maximum of {max}")]
    #[diagnostic(code(skyloom::registry::entry_too_long))]
    EntryDataTooLong {
        /// Length of the rejected data
        len: usize,
        /// Registry limit
        max: usize,
    },

    /// A registry entry returned by the portal was not signed by its owner
    #[error("registry entry signature does not match the public key")]
    #[diagnostic(
        code(skyloom::registry::invalid_signature),
        help("the portal may be malicious or misconfigured")
    )]
    InvalidSignature,

    /// Key material or a pre-hashed data key was malformed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Crypto(#[from] CryptoError),

    /// Portal request failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),
}

impl From<TransportError> for SkyDbError {
    fn from(e: TransportError) -> Self {
        Self::Client(e.into())
    }
}

/// Result type for portal and SkyDB operations
pub type Result<T> = core::result::Result<T, SkyDbError>;
