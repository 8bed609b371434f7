//! SkyDB: mutable JSON records on top of the registry and the blob store.
//!
//! A record is a registry entry whose data is the raw skylink of a JSON blob
//! wrapped as `{"_data": <value>, "_v": 2}`. Setting a record uploads a new
//! blob and points the entry at it with the next revision.
//!
//! Two stores implement [`MutableRecordStore`]:
//!
//! - [`SkyDb`] looks up the current revision before every write. Two writers
//!   racing on one key can pick the same revision, and one of them will be
//!   rejected by the portal.
//! - [`SkyDbV2`] keeps a [`RevisionCache`](crate::revision_cache::RevisionCache)
//!   and serializes writes per key, failing fast with
//!   [`SkyDbError::ConcurrentAccess`] on contention. Prefer it.

mod backend;
mod v1;
mod v2;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use skyloom_common::types::crypto::{PrivateKey, PublicKey};
use skyloom_common::types::registry::{
    DELETION_ENTRY_DATA, MAX_ENTRY_LENGTH, RegistryEntry, SignedRegistryEntry,
    is_deletion_entry_data,
};
use skyloom_common::types::skylink::{
    BASE64_ENCODED_SKYLINK_SIZE, RAW_SKYLINK_SIZE, Skylink, SkylinkError,
};

use crate::client::{BlobResponse, BlobStore};
use crate::error::{Result, SkyDbError};
use crate::registry::{GetEntryOptions, RegistryClient, SetEntryOptions};

use backend::Payload;

pub use v1::SkyDb;
pub use v2::SkyDbV2;

/// Envelope version written into `_v`.
pub const SKYDB_ENVELOPE_VERSION: u64 = 2;

/// Content type SkyDB blobs are uploaded with.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A JSON record and the skylink it was read from or written to.
///
/// Both fields are `None` when the key was never written or has been deleted.
/// `data` alone is `None` when the caller's cached data link is still current.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonData {
    /// Record contents
    pub data: Option<Value>,
    /// `sia://` skylink of the blob holding the record
    pub data_link: Option<String>,
}

/// Raw blob contents behind a registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBytesData {
    /// Blob contents
    pub data: Option<Vec<u8>>,
    /// `sia://` skylink of the blob
    pub data_link: Option<String>,
}

/// Options for reading records.
#[derive(Debug, Clone, Default)]
pub struct GetJsonOptions {
    /// Skylink of the blob the caller already holds; if the entry still
    /// points at it the download is skipped
    pub cached_data_link: Option<String>,
    /// The data key is already hashed and hex-encoded
    pub hashed_data_key_hex: bool,
}

impl GetJsonOptions {
    fn entry_options(&self) -> GetEntryOptions {
        GetEntryOptions {
            hashed_data_key_hex: self.hashed_data_key_hex,
            timeout_secs: None,
        }
    }
}

/// Options for writing records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetJsonOptions {
    /// The data key is already hashed and hex-encoded
    pub hashed_data_key_hex: bool,
}

impl From<SetJsonOptions> for SetEntryOptions {
    fn from(opts: SetJsonOptions) -> Self {
        SetEntryOptions {
            hashed_data_key_hex: opts.hashed_data_key_hex,
        }
    }
}

/// Mutable records addressed by `(public key, data key)`.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait MutableRecordStore {
    /// Read the JSON record stored under `(public_key, data_key)`.
    fn get_json(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetJsonOptions,
    ) -> impl Future<Output = Result<JsonData>>;

    /// Upload `json` and point `data_key` at it with the next revision.
    fn set_json(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        json: Value,
        opts: SetJsonOptions,
    ) -> impl Future<Output = Result<JsonData>>;

    /// Point `data_key` at an existing skylink without uploading anything.
    fn set_data_link(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        data_link: &str,
        opts: SetJsonOptions,
    ) -> impl Future<Output = Result<()>>;

    /// Raw entry data, or `None` if the entry is missing or deleted.
    fn get_entry_data(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetEntryOptions,
    ) -> impl Future<Output = Result<Option<Vec<u8>>>>;

    /// Write raw entry data (at most 70 bytes) with the next revision.
    fn set_entry_data(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        data: Vec<u8>,
        opts: SetEntryOptions,
    ) -> impl Future<Output = Result<()>>;

    /// Mark the entry deleted by writing the deletion sentinel.
    fn delete_entry_data(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        opts: SetEntryOptions,
    ) -> impl Future<Output = Result<()>>;

    /// Delete a JSON record. Later reads return empty [`JsonData`].
    fn delete_json(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        opts: SetJsonOptions,
    ) -> impl Future<Output = Result<()>>;

    /// Like [`get_json`](Self::get_json) but returns the blob bytes unparsed.
    fn get_raw_bytes(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetJsonOptions,
    ) -> impl Future<Output = Result<RawBytesData>>;
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "_data")]
    data: &'a Value,
    #[serde(rename = "_v")]
    version: u64,
}

/// Serialize `json` inside the versioned envelope.
pub fn wrap_envelope(json: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(&Envelope {
        data: json,
        version: SKYDB_ENVELOPE_VERSION,
    })
    .map_err(|e| SkyDbError::DataFormat(format!("could not serialize record: {e}")))
}

/// Parse an enveloped blob and return its `_data` value.
pub fn unwrap_envelope(bytes: &[u8]) -> Result<Value> {
    let outer: Value = serde_json::from_slice(bytes)
        .map_err(|e| SkyDbError::DataFormat(format!("record is not valid JSON: {e}")))?;
    match outer {
        Value::Object(mut map) => map
            .remove("_data")
            .ok_or_else(|| SkyDbError::DataFormat("record has no '_data' field".into())),
        other => Err(SkyDbError::DataFormat(format!(
            "record is not a JSON object: {other}"
        ))),
    }
}

/// Interpret registry entry data as a skylink.
///
/// Empty data and the deletion sentinel mean "no record". Besides raw
/// 34-byte skylinks, entries holding the 46-character base64 skylink text
/// are accepted.
pub fn entry_data_skylink(data: &[u8]) -> Result<Option<Skylink>> {
    if data.is_empty() || is_deletion_entry_data(data) {
        return Ok(None);
    }
    match data.len() {
        RAW_SKYLINK_SIZE => Ok(Some(Skylink::from_slice(data)?)),
        BASE64_ENCODED_SKYLINK_SIZE => {
            let text = std::str::from_utf8(data).map_err(|e| SkylinkError::InvalidEncoding {
                encoding: "utf-8",
                reason: e.to_string(),
            })?;
            Ok(Some(Skylink::parse(text)?))
        }
        got => Err(SkylinkError::IncorrectSize {
            expected: "34 raw bytes or 46 base64 characters",
            got,
        }
        .into()),
    }
}

/// Entry data accepted by the raw setters.
pub(crate) fn check_entry_data(data: &[u8]) -> Result<()> {
    if is_deletion_entry_data(data) {
        return Err(SkyDbError::DeletionSentinel);
    }
    if data.len() > MAX_ENTRY_LENGTH {
        return Err(SkyDbError::EntryDataTooLong {
            len: data.len(),
            max: MAX_ENTRY_LENGTH,
        });
    }
    Ok(())
}

/// Turn a payload into entry data, uploading if needed. Returns the skylink
/// the entry will point at, if any.
pub(crate) async fn prepare_payload<P>(
    portal: &P,
    data_key: &str,
    payload: Payload,
) -> Result<(Vec<u8>, Option<Skylink>)>
where
    P: BlobStore + Sync,
{
    match payload {
        Payload::Json(json) => {
            let blob = wrap_envelope(&json)?;
            let skylink = portal
                .upload_data(blob, data_key, JSON_CONTENT_TYPE)
                .await?;
            check_entry_data(skylink.as_bytes())?;
            Ok((skylink.as_bytes().to_vec(), Some(skylink)))
        }
        Payload::Link(skylink) => Ok((skylink.as_bytes().to_vec(), Some(skylink))),
        Payload::Raw(data) => Ok((data, None)),
        Payload::Delete => Ok((DELETION_ENTRY_DATA.to_vec(), None)),
    }
}

/// Prepare a payload and submit it at `revision`.
pub(crate) async fn submit<P>(
    portal: &P,
    private_key: &PrivateKey,
    data_key: &str,
    payload: Payload,
    revision: u64,
    opts: SetEntryOptions,
) -> Result<Option<Skylink>>
where
    P: BlobStore + RegistryClient + Sync,
{
    let (data, skylink) = prepare_payload(portal, data_key, payload).await?;
    portal
        .set_entry(private_key, RegistryEntry::new(data_key, data, revision), opts)
        .await?;
    Ok(skylink)
}

/// Read path shared by both stores. `observe` is called with the revision of
/// any entry found, before its blob is fetched.
pub(crate) async fn read_blob<P, O>(
    portal: &P,
    public_key: &PublicKey,
    data_key: &str,
    opts: &GetJsonOptions,
    observe: O,
) -> Result<Option<(Skylink, Option<BlobResponse>)>>
where
    P: BlobStore + RegistryClient + Sync,
    O: FnOnce(&SignedRegistryEntry) -> Result<()>,
{
    let Some(signed) = portal
        .get_entry(public_key, data_key, opts.entry_options())
        .await?
    else {
        return Ok(None);
    };
    observe(&signed)?;

    let Some(skylink) = entry_data_skylink(&signed.entry.data)? else {
        return Ok(None);
    };

    if let Some(cached) = &opts.cached_data_link {
        if Skylink::parse(cached)? == skylink {
            #[cfg(feature = "tracing")]
            tracing::debug!(%skylink, "cached data link is current, skipping download");
            return Ok(Some((skylink, None)));
        }
    }

    let blob = portal.download_data(&skylink.to_base64()).await?;
    Ok(Some((skylink, Some(blob))))
}

/// Read a JSON record through [`read_blob`].
pub(crate) async fn read_json<P, O>(
    portal: &P,
    public_key: &PublicKey,
    data_key: &str,
    opts: &GetJsonOptions,
    observe: O,
) -> Result<JsonData>
where
    P: BlobStore + RegistryClient + Sync,
    O: FnOnce(&SignedRegistryEntry) -> Result<()>,
{
    match read_blob(portal, public_key, data_key, opts, observe).await? {
        None => Ok(JsonData::default()),
        Some((skylink, None)) => Ok(JsonData {
            data: None,
            data_link: Some(skylink.to_uri()),
        }),
        Some((skylink, Some(blob))) => {
            if !blob.is_json() {
                return Err(SkyDbError::DataFormat(format!(
                    "expected JSON content for '{data_key}', got {}",
                    blob.content_type.as_deref().unwrap_or("no content type")
                )));
            }
            Ok(JsonData {
                data: Some(unwrap_envelope(&blob.bytes)?),
                data_link: Some(skylink.to_uri()),
            })
        }
    }
}

/// Read raw blob bytes through [`read_blob`].
pub(crate) async fn read_raw<P, O>(
    portal: &P,
    public_key: &PublicKey,
    data_key: &str,
    opts: &GetJsonOptions,
    observe: O,
) -> Result<RawBytesData>
where
    P: BlobStore + RegistryClient + Sync,
    O: FnOnce(&SignedRegistryEntry) -> Result<()>,
{
    Ok(
        match read_blob(portal, public_key, data_key, opts, observe).await? {
            None => RawBytesData::default(),
            Some((skylink, blob)) => RawBytesData {
                data: blob.map(|b| b.bytes.to_vec()),
                data_link: Some(skylink.to_uri()),
            },
        },
    )
}

/// Read raw entry data; deleted entries read as `None`.
pub(crate) async fn read_entry_data<P, O>(
    portal: &P,
    public_key: &PublicKey,
    data_key: &str,
    opts: GetEntryOptions,
    observe: O,
) -> Result<Option<Vec<u8>>>
where
    P: RegistryClient + Sync,
    O: FnOnce(&SignedRegistryEntry) -> Result<()>,
{
    let Some(signed) = portal.get_entry(public_key, data_key, opts).await? else {
        return Ok(None);
    };
    observe(&signed)?;
    if is_deletion_entry_data(&signed.entry.data) {
        return Ok(None);
    }
    Ok(Some(signed.entry.data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKYLINK: &str = "XABvi7JtJbQSMAcDwnUnmp2FKDPjg8_tTTFP4BwMSxVdEg";

    #[test]
    fn envelope_wraps_and_unwraps() {
        let json = serde_json::json!({"example": "hi"});
        let bytes = wrap_envelope(&json).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"_data":{"example":"hi"},"_v":2}"#
        );
        assert_eq!(unwrap_envelope(&bytes).unwrap(), json);
    }

    #[test]
    fn envelope_requires_data_field() {
        assert!(matches!(
            unwrap_envelope(br#"{"_v":2}"#),
            Err(SkyDbError::DataFormat(_))
        ));
        assert!(matches!(
            unwrap_envelope(b"not json"),
            Err(SkyDbError::DataFormat(_))
        ));
        assert!(matches!(
            unwrap_envelope(b"[1,2]"),
            Err(SkyDbError::DataFormat(_))
        ));
        // Null payloads are kept.
        assert_eq!(
            unwrap_envelope(br#"{"_data":null,"_v":2}"#).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn entry_data_decodes_raw_and_text_skylinks() {
        let skylink = Skylink::parse(SKYLINK).unwrap();
        assert_eq!(
            entry_data_skylink(skylink.as_bytes()).unwrap(),
            Some(skylink)
        );
        assert_eq!(
            entry_data_skylink(SKYLINK.as_bytes()).unwrap(),
            Some(skylink)
        );
        assert_eq!(entry_data_skylink(&[]).unwrap(), None);
        assert_eq!(entry_data_skylink(&DELETION_ENTRY_DATA).unwrap(), None);
        assert!(matches!(
            entry_data_skylink(&[1, 2, 3]),
            Err(SkyDbError::IncorrectSize(SkylinkError::IncorrectSize {
                got: 3,
                ..
            }))
        ));
    }

    #[test]
    fn raw_payload_rejects_sentinel_and_oversize() {
        assert!(matches!(
            Payload::raw(DELETION_ENTRY_DATA.to_vec()),
            Err(SkyDbError::DeletionSentinel)
        ));
        assert!(matches!(
            Payload::raw(vec![1; MAX_ENTRY_LENGTH + 1]),
            Err(SkyDbError::EntryDataTooLong { len: 71, .. })
        ));
        assert!(Payload::raw(vec![1; MAX_ENTRY_LENGTH]).is_ok());
        assert!(Payload::raw(Vec::new()).is_ok());
    }

    #[test]
    fn link_payload_rejects_zero_skylink() {
        let zero = Skylink::from_raw(DELETION_ENTRY_DATA).to_base64();
        assert!(matches!(
            Payload::link(&zero),
            Err(SkyDbError::DeletionSentinel)
        ));
        assert!(matches!(
            Payload::link("short"),
            Err(SkyDbError::IncorrectSize(_))
        ));
        assert!(Payload::link(&format!("sia://{SKYLINK}")).is_ok());
    }
}
