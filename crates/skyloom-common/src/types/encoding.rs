//! Sia binary encoding helpers used when hashing registry entries and seeds.
//!
//! Sia encodes every variable-length value with a little-endian `u64` length
//! prefix, and every integer as 8 little-endian bytes.

/// Encode a `u64` as 8 little-endian bytes.
pub fn encode_u64(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}

/// Encode a byte string prefixed by its length as a little-endian `u64`.
pub fn encode_prefixed_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(8 + bytes.len());
    encoded.extend_from_slice(&encode_u64(bytes.len() as u64));
    encoded.extend_from_slice(bytes);
    encoded
}

/// Encode a UTF-8 string prefixed by its byte length.
pub fn encode_utf8_string(s: &str) -> Vec<u8> {
    encode_prefixed_bytes(s.as_bytes())
}
