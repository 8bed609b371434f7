//! Registry access over the portal's `/skynet/registry` endpoint.

use std::future::Future;

use http::Method;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use url::Url;

use skyloom_common::error::{ClientError, DecodeError, HttpError, TransportError};
use skyloom_common::http_client::HttpClient;
use skyloom_common::types::crypto::{CryptoError, PrivateKey, PublicKey, Signature};
use skyloom_common::types::registry::{
    MAX_ENTRY_LENGTH, RegistryEntry, SignedRegistryEntry, data_key_bytes,
};

use crate::client::SkynetClient;
use crate::error::{Result, SkyDbError};

/// Options for registry lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetEntryOptions {
    /// The data key is already hashed and hex-encoded
    pub hashed_data_key_hex: bool,
    /// Override the client's registry lookup timeout, in seconds
    pub timeout_secs: Option<u64>,
}

/// Options for registry writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetEntryOptions {
    /// The data key is already hashed and hex-encoded
    pub hashed_data_key_hex: bool,
}

/// Signed, versioned key-value registry.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait RegistryClient {
    /// Look up the entry stored under `(public_key, data_key)`.
    ///
    /// Returns `Ok(None)` when no entry exists. Returned entries have had
    /// their signature checked against `public_key`.
    fn get_entry(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetEntryOptions,
    ) -> impl Future<Output = Result<Option<SignedRegistryEntry>>>;

    /// Sign `entry` with `private_key` and submit it.
    ///
    /// The registry only accepts revisions strictly greater than the one it
    /// already stores; anything else comes back as
    /// [`SkyDbError::RegistryRejected`].
    fn set_entry(
        &self,
        private_key: &PrivateKey,
        entry: RegistryEntry,
        opts: SetEntryOptions,
    ) -> impl Future<Output = Result<()>>;
}

/// Registry lookup response body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEntryResponse {
    /// Hex-encoded entry data
    pub data: String,
    /// Entry revision; some portals send it as a decimal string
    #[serde(deserialize_with = "de_revision")]
    pub revision: u64,
    /// Hex-encoded signature
    pub signature: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RevisionRepr {
    Number(u64),
    Text(String),
}

fn de_revision<'de, D>(deserializer: D) -> core::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RevisionRepr::deserialize(deserializer)? {
        RevisionRepr::Number(n) => Ok(n),
        RevisionRepr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Public key as the registry write endpoint expects it.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryPublicKey {
    /// Always `ed25519`
    pub algorithm: &'static str,
    /// Raw key bytes
    pub key: Vec<u8>,
}

/// Registry write request body.
#[derive(Debug, Clone, Serialize)]
pub struct SetEntryRequest {
    /// Owner of the entry
    pub publickey: RegistryPublicKey,
    /// Hex of the hashed data key
    pub datakey: String,
    /// Entry revision
    pub revision: u64,
    /// Raw entry data
    pub data: Vec<u8>,
    /// Raw signature bytes
    pub signature: Vec<u8>,
}

impl SetEntryRequest {
    /// Build the request body for a signed entry.
    pub fn new(
        public_key: &PublicKey,
        signed: &SignedRegistryEntry,
        hashed_data_key_hex: bool,
    ) -> core::result::Result<Self, CryptoError> {
        let datakey = data_key_bytes(&signed.entry.data_key, hashed_data_key_hex)?;
        Ok(Self {
            publickey: RegistryPublicKey {
                algorithm: "ed25519",
                key: public_key.as_bytes().to_vec(),
            },
            datakey: hex::encode(datakey),
            revision: signed.entry.revision,
            data: signed.entry.data.clone(),
            signature: signed.signature.as_bytes().to_vec(),
        })
    }
}

fn decode_field(field: &'static str, value: &str) -> core::result::Result<Vec<u8>, DecodeError> {
    hex::decode(value).map_err(|e| DecodeError::Field {
        field,
        reason: e.to_string(),
    })
}

impl<C: HttpClient> SkynetClient<C> {
    /// URL of the registry lookup for `(public_key, data_key)`.
    pub fn get_entry_url(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetEntryOptions,
    ) -> Result<Url> {
        let datakey = data_key_bytes(data_key, opts.hashed_data_key_hex)?;
        let timeout = opts
            .timeout_secs
            .unwrap_or(self.options().registry_timeout_secs);
        let mut url = self.make_url(&self.options().endpoint_registry, "");
        url.set_query(Some(&format!(
            "publickey=ed25519:{}&datakey={}&timeout={}",
            public_key.to_hex(),
            hex::encode(datakey),
            timeout
        )));
        Ok(url)
    }
}

impl<C: HttpClient + Sync> RegistryClient for SkynetClient<C> {
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, opts), fields(public_key = %public_key)))]
    async fn get_entry(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetEntryOptions,
    ) -> Result<Option<SignedRegistryEntry>> {
        let url = self.get_entry_url(public_key, data_key, opts)?;
        let request = self
            .request(Method::GET, &url)?
            .body(Vec::new())
            .map_err(TransportError::from)?;

        let response = self.execute(request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClientError::from(HttpError {
                status,
                body: Some(response.into_body().into()),
            })
            .into());
        }

        let body: RegistryEntryResponse = serde_json::from_slice(response.body())
            .map_err(|e| ClientError::Decode(e.into()))?;
        let data = decode_field("data", &body.data).map_err(ClientError::from)?;
        let signature = decode_field("signature", &body.signature).map_err(ClientError::from)?;
        let got = signature.len();
        let signature: [u8; 64] = signature.try_into().map_err(|_| {
            SkyDbError::from(CryptoError::InvalidLength {
                what: "signature",
                expected: 64,
                got,
            })
        })?;

        let signed = SignedRegistryEntry {
            entry: RegistryEntry::new(data_key, data, body.revision),
            signature: Signature::from_bytes(signature),
        };
        signed
            .verify(public_key, opts.hashed_data_key_hex)
            .map_err(|e| match e {
                CryptoError::BadSignature => SkyDbError::InvalidSignature,
                other => other.into(),
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(revision = signed.entry.revision, "registry entry found");

        Ok(Some(signed))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, private_key, entry, opts), fields(data_key = %entry.data_key, revision = entry.revision)))]
    async fn set_entry(
        &self,
        private_key: &PrivateKey,
        entry: RegistryEntry,
        opts: SetEntryOptions,
    ) -> Result<()> {
        if entry.data.len() > MAX_ENTRY_LENGTH {
            return Err(SkyDbError::EntryDataTooLong {
                len: entry.data.len(),
                max: MAX_ENTRY_LENGTH,
            });
        }

        let public_key = private_key.public_key();
        let signed = entry.sign(private_key, opts.hashed_data_key_hex)?;
        let body = SetEntryRequest::new(&public_key, &signed, opts.hashed_data_key_hex)?;
        let body = serde_json::to_vec(&body).map_err(|e| ClientError::Decode(e.into()))?;

        let url = self.make_url(&self.options().endpoint_registry, "");
        let request = self
            .request(Method::POST, &url)?
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .map_err(TransportError::from)?;

        let response = self.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SkyDbError::RegistryRejected {
                status,
                body: String::from_utf8_lossy(response.body()).into_owned(),
            });
        }
        Ok(())
    }
}
