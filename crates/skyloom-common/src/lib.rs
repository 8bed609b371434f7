//! Common types for the skyloom Skynet client
//!
//! This crate holds the pieces that every other skyloom crate speaks in:
//!
//! - [`types::skylink`]: the 34-byte content identifier and its base32/base64 text forms
//! - [`types::crypto`]: Ed25519 key material, Blake2b hashing, seed-based key derivation
//! - [`types::registry`]: the signed, versioned registry entry and its signable digest
//! - [`http_client`]: the transport abstraction the portal client is generic over
//! - [`error`]: transport and decoding errors shared by portal calls

#![warn(missing_docs)]
pub use smol_str;
pub use url;

pub mod error;
/// HTTP client abstraction used by skyloom crates.
pub mod http_client;
/// Baseline fundamental Skynet data types.
pub mod types;

pub use types::crypto::{KeyPair, PrivateKey, PublicKey, Signature};
pub use types::registry::{RegistryEntry, SignedRegistryEntry};
pub use types::skylink::Skylink;
