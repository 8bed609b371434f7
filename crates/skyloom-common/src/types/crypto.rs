//! Key material, signatures and hashing.
//!
//! Keys are Ed25519 and travel hex-encoded: a public key is 32 bytes (64 hex
//! characters) and a private key is the 64-byte keypair form, seed followed by
//! public key (128 hex characters). Hashing is Blake2b with a 32-byte digest.
//!
//! ```
//! use skyloom_common::types::crypto::gen_key_pair_from_seed;
//!
//! let keys = gen_key_pair_from_seed("insecure test seed");
//! assert_eq!(
//!     keys.public_key.to_hex(),
//!     "658b900df55e983ce85f3f9fb2a088d568ab514e7bbda51cfbfb16ea945378d9"
//! );
//! assert_eq!(keys.private_key.public_key(), keys.public_key);
//! ```

use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use sha2::Sha256;

use crate::types::encoding::encode_utf8_string;

/// Length in bytes of a Blake2b digest.
pub const HASH_LENGTH: usize = 32;

/// Length in bytes of an Ed25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length in bytes of an Ed25519 private key in keypair form.
pub const PRIVATE_KEY_LENGTH: usize = 64;

/// Length in bytes of an Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = 64;

const SEED_PBKDF2_ROUNDS: u32 = 1000;

type Blake2b256 = Blake2b<U32>;

/// Errors from decoding or using key material
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic, PartialEq, Eq)]
pub enum CryptoError {
    #[error("{what} is not valid hex: {reason}")]
    #[diagnostic(code(skyloom::crypto::hex))]
    /// Hex decode error
    Hex {
        /// Which value failed to decode
        what: &'static str,
        /// Decoder message
        reason: String,
    },
    #[error("invalid {what} length: expected {expected} bytes, got {got}")]
    #[diagnostic(code(skyloom::crypto::length))]
    /// Invalid key or signature length
    InvalidLength {
        /// Which value had the wrong length
        what: &'static str,
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        got: usize,
    },
    #[error("invalid private key: {0}")]
    #[diagnostic(
        code(skyloom::crypto::private_key),
        help("private keys are the 64-byte seed-then-public-key form; the public half must match the seed")
    )]
    /// Private key halves are inconsistent
    InvalidPrivateKey(String),
    #[error("invalid public key: {0}")]
    #[diagnostic(code(skyloom::crypto::public_key))]
    /// Public key is not a valid curve point
    InvalidPublicKey(String),
    #[error("signature verification failed")]
    #[diagnostic(code(skyloom::crypto::signature))]
    /// Signature does not match the message and key
    BadSignature,
}

fn decode_fixed<const N: usize>(what: &'static str, s: &str) -> Result<[u8; N], CryptoError> {
    let bytes = hex::decode(s).map_err(|e| CryptoError::Hex {
        what,
        reason: e.to_string(),
    })?;
    let got = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        what,
        expected: N,
        got,
    })
}

/// Hash all of the given byte strings, in order, with Blake2b-256.
pub fn hash_all<I, B>(parts: I) -> [u8; HASH_LENGTH]
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    hasher.finalize().into()
}

/// An Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Wrap raw public key bytes.
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Decode a 64-character hex public key.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        decode_fixed("public key", s).map(Self)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let key = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &signature)
            .map_err(|_| CryptoError::BadSignature)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl std::str::FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// An Ed25519 private key.
///
/// `Debug` never prints key material.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Decode a 128-character hex private key (seed followed by public key).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes: [u8; PRIVATE_KEY_LENGTH] = decode_fixed("private key", s)?;
        SigningKey::from_keypair_bytes(&bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    /// Build a private key from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(seed))
    }

    /// Hex form (seed followed by public key).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_keypair_bytes())
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    /// Sign `message`, normally a 32-byte registry entry digest.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message).to_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey")
            .field(&self.public_key().to_hex())
            .finish()
    }
}

impl std::str::FromStr for PrivateKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    /// Wrap raw signature bytes.
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Decode a 128-character hex signature.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        decode_fixed("signature", s).map(Self)
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// A matching public/private key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Public half
    pub public_key: PublicKey,
    /// Private half
    pub private_key: PrivateKey,
}

impl From<PrivateKey> for KeyPair {
    fn from(private_key: PrivateKey) -> Self {
        Self {
            public_key: private_key.public_key(),
            private_key,
        }
    }
}

/// A key pair together with the hex seed it was derived from.
#[derive(Debug, Clone)]
pub struct KeyPairAndSeed {
    /// Derived keys
    pub key_pair: KeyPair,
    /// Hex-encoded random seed
    pub seed: String,
}

/// Deterministically derive a key pair from a secret seed string.
///
/// The seed is stretched with PBKDF2-HMAC-SHA256 (1000 rounds, empty salt) into
/// a 32-byte Ed25519 seed, so the same seed always yields the same keys.
pub fn gen_key_pair_from_seed(seed: &str) -> KeyPair {
    let mut derived = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(seed.as_bytes(), b"", SEED_PBKDF2_ROUNDS, &mut derived);
    PrivateKey::from_seed(&derived).into()
}

/// Generate a random hex seed of `length` bytes and the key pair derived from it.
pub fn gen_key_pair_and_seed(length: usize) -> KeyPairAndSeed {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    let seed = hex::encode(bytes);
    KeyPairAndSeed {
        key_pair: gen_key_pair_from_seed(&seed),
        seed,
    }
}

/// Derive a child seed from a master seed and a sub seed, hex-encoded.
pub fn derive_child_seed(master_seed: &str, seed: &str) -> String {
    hex::encode(hash_all([
        encode_utf8_string(master_seed),
        encode_utf8_string(seed),
    ]))
}
