//! Skylinks: fixed-size identifiers of immutable blobs on Skynet.
//!
//! A skylink is 34 raw bytes. It has two text forms that are never used
//! interchangeably without an explicit conversion:
//!
//! - base64 URL-safe without padding (46 characters), used in path-style URLs
//!   and in everything this crate emits
//! - base32 with the RFC 4648 "hex" alphabet (55 characters, case-insensitive),
//!   used in subdomain-style URLs
//!
//! ```
//! use skyloom_common::types::skylink::Skylink;
//!
//! let link: Skylink = "sia://CABAB_1Dt0FJsxqsu_J4TodNCbCGvtFf1Uys_3EgzOlTcg".parse().unwrap();
//! assert_eq!(link.to_base32(), "100401vt8erk2idj3ambnsjo9q3kq2dggqvd2nul9imfus90pjkl6sg");
//! assert_eq!(link.to_uri(), "sia://CABAB_1Dt0FJsxqsu_J4TodNCbCGvtFf1Uys_3EgzOlTcg");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use base64::Engine;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use data_encoding::{BASE32HEX_NOPAD, Encoding, Specification};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// The raw size in bytes of the data that gets put into a link.
pub const RAW_SKYLINK_SIZE: usize = 34;

/// The string length of a skylink encoded using base32.
pub const BASE32_ENCODED_SKYLINK_SIZE: usize = 55;

/// The string length of a skylink encoded using base64.
pub const BASE64_ENCODED_SKYLINK_SIZE: usize = 46;

/// URI scheme prefixed to skylinks at the API boundary.
pub const URI_SKYNET_PREFIX: &str = "sia://";

/// Errors from decoding skylink text.
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic, PartialEq, Eq)]
pub enum SkylinkError {
    /// The input, or what it decoded to, had the wrong length
    #[error("skylink has incorrect size: expected {expected}, got {got}")]
    #[diagnostic(
        code(skyloom::skylink::incorrect_size),
        help("skylinks are 46 base64 or 55 base32 characters, optionally prefixed with sia://")
    )]
    IncorrectSize {
        /// Description of the expected size
        expected: &'static str,
        /// Actual size of the input
        got: usize,
    },
    /// The input had the right length but contained invalid symbols
    #[error("skylink is not valid {encoding}: {reason}")]
    #[diagnostic(code(skyloom::skylink::invalid_encoding))]
    InvalidEncoding {
        /// Encoding that was attempted
        encoding: &'static str,
        /// Decoder message
        reason: String,
    },
}

// Decoders ignore non-zero bits past the last full byte; encoders stay canonical.
const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

static BASE32HEX_LENIENT: LazyLock<Encoding> = LazyLock::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str("0123456789ABCDEFGHIJKLMNOPQRSTUV");
    spec.check_trailing_bits = false;
    spec.encoding().expect("base32hex specification is valid")
});

fn into_raw(bytes: Vec<u8>) -> Result<[u8; RAW_SKYLINK_SIZE], SkylinkError> {
    let got = bytes.len();
    bytes.try_into().map_err(|_| SkylinkError::IncorrectSize {
        expected: "34 decoded bytes",
        got,
    })
}

/// Decode a 55-character base32 (RFC 4648 hex alphabet) skylink.
pub fn decode_base32(skylink: &str) -> Result<[u8; RAW_SKYLINK_SIZE], SkylinkError> {
    if skylink.len() != BASE32_ENCODED_SKYLINK_SIZE {
        return Err(SkylinkError::IncorrectSize {
            expected: "55 base32 characters",
            got: skylink.len(),
        });
    }
    let upper = skylink.to_ascii_uppercase();
    let bytes = BASE32HEX_LENIENT
        .decode(upper.as_bytes())
        .map_err(|e| SkylinkError::InvalidEncoding {
            encoding: "base32",
            reason: e.to_string(),
        })?;
    into_raw(bytes)
}

/// Decode a 46-character URL-safe base64 skylink.
pub fn decode_base64(skylink: &str) -> Result<[u8; RAW_SKYLINK_SIZE], SkylinkError> {
    if skylink.len() != BASE64_ENCODED_SKYLINK_SIZE {
        return Err(SkylinkError::IncorrectSize {
            expected: "46 base64 characters",
            got: skylink.len(),
        });
    }
    let standard: String = skylink
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .chain("==".chars())
        .collect();
    let bytes = BASE64_LENIENT
        .decode(standard)
        .map_err(|e| SkylinkError::InvalidEncoding {
            encoding: "base64",
            reason: e.to_string(),
        })?;
    into_raw(bytes)
}

/// Encode raw skylink bytes as lowercase base32.
pub fn encode_base32(bytes: &[u8; RAW_SKYLINK_SIZE]) -> String {
    BASE32HEX_NOPAD.encode(bytes).to_ascii_lowercase()
}

/// Encode raw skylink bytes as URL-safe base64 without padding.
pub fn encode_base64(bytes: &[u8; RAW_SKYLINK_SIZE]) -> String {
    let mut encoded: String = BASE64_LENIENT
        .encode(bytes)
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    // 34 bytes always encode to 48 characters ending in "=="
    encoded.truncate(BASE64_ENCODED_SKYLINK_SIZE);
    encoded
}

/// Decode either text form of a skylink, with or without the `sia://` prefix.
pub fn decode_any(encoded: &str) -> Result<[u8; RAW_SKYLINK_SIZE], SkylinkError> {
    let encoded = trim_uri_prefix(encoded, URI_SKYNET_PREFIX);
    match encoded.len() {
        BASE32_ENCODED_SKYLINK_SIZE => decode_base32(encoded),
        BASE64_ENCODED_SKYLINK_SIZE => decode_base64(encoded),
        got => Err(SkylinkError::IncorrectSize {
            expected: "46 base64 or 55 base32 characters",
            got,
        }),
    }
}

/// Strip a URI prefix such as `sia://` from the front of `s`.
///
/// Matching is case-insensitive and also accepts the prefix without its
/// trailing slashes (`sia:`).
pub fn trim_uri_prefix<'a>(s: &'a str, prefix: &str) -> &'a str {
    let short = prefix.trim_end_matches('/');
    for candidate in [prefix, short] {
        if let Some(head) = s.get(..candidate.len()) {
            if head.eq_ignore_ascii_case(candidate) {
                return &s[candidate.len()..];
            }
        }
    }
    s
}

/// Prefix a skylink with `sia://` unless it is empty or already prefixed.
pub fn format_skylink(skylink: &str) -> String {
    if skylink.is_empty() || skylink.starts_with(URI_SKYNET_PREFIX) {
        skylink.to_owned()
    } else {
        format!("{URI_SKYNET_PREFIX}{skylink}")
    }
}

/// A decoded skylink.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Skylink([u8; RAW_SKYLINK_SIZE]);

impl Skylink {
    /// Wrap raw skylink bytes.
    pub const fn from_raw(bytes: [u8; RAW_SKYLINK_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a skylink from a byte slice, which must be exactly 34 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SkylinkError> {
        into_raw(bytes.to_vec()).map(Self)
    }

    /// Parse either text form, with or without the `sia://` prefix.
    pub fn parse(encoded: &str) -> Result<Self, SkylinkError> {
        decode_any(encoded).map(Self)
    }

    /// Raw bytes of the skylink.
    pub fn as_bytes(&self) -> &[u8; RAW_SKYLINK_SIZE] {
        &self.0
    }

    /// URL-safe base64 text form.
    pub fn to_base64(&self) -> String {
        encode_base64(&self.0)
    }

    /// Lowercase base32 text form.
    pub fn to_base32(&self) -> String {
        encode_base32(&self.0)
    }

    /// Base64 form with the `sia://` prefix.
    pub fn to_uri(&self) -> String {
        format!("{URI_SKYNET_PREFIX}{}", self.to_base64())
    }
}

impl fmt::Display for Skylink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Skylink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Skylink({})", self.to_base64())
    }
}

impl FromStr for Skylink {
    type Err = SkylinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<[u8]> for Skylink {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Skylink> for String {
    fn from(value: Skylink) -> Self {
        value.to_base64()
    }
}

impl Serialize for Skylink {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Skylink {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Skylink::parse(&s).map_err(de::Error::custom)
    }
}
