use std::future::Future;

use serde_json::Value;

use skyloom_common::types::crypto::{PrivateKey, PublicKey};
use skyloom_common::types::registry::SignedRegistryEntry;
use skyloom_common::types::skylink::Skylink;

use super::{
    GetJsonOptions, JsonData, MutableRecordStore, RawBytesData, SetJsonOptions, check_entry_data,
    read_entry_data, read_json, read_raw,
};
use crate::client::BlobStore;
use crate::error::Result;
use crate::registry::{GetEntryOptions, RegistryClient, SetEntryOptions};

/// What a write puts into the entry.
pub enum Payload {
    /// Upload this record and store its skylink
    Json(Value),
    /// Store an existing skylink
    Link(Skylink),
    /// Store these bytes
    Raw(Vec<u8>),
    /// Store the deletion sentinel
    Delete,
}

impl Payload {
    pub(crate) fn link(data_link: &str) -> Result<Self> {
        let skylink = Skylink::parse(data_link)?;
        check_entry_data(skylink.as_bytes())?;
        Ok(Self::Link(skylink))
    }

    pub(crate) fn raw(data: Vec<u8>) -> Result<Self> {
        check_entry_data(&data)?;
        Ok(Self::Raw(data))
    }
}

/// The part of a SkyDB store that differs between versions: how a write
/// picks its revision, and what a read does with the entry it found.
///
/// Every backend gets [`MutableRecordStore`] through the impl below.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait RecordBackend {
    /// Portal client the store talks through
    type Portal: BlobStore + RegistryClient + Sync;

    /// The portal client.
    fn portal(&self) -> &Self::Portal;

    /// Called with each entry a read finds, before its blob is fetched.
    fn observe(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        hashed_data_key_hex: bool,
        signed: &SignedRegistryEntry,
    ) -> Result<()>;

    /// Write `payload` under `data_key` at the next revision. Returns the
    /// skylink the entry now points at, if any.
    fn write(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        payload: Payload,
        opts: SetEntryOptions,
    ) -> impl Future<Output = Result<Option<Skylink>>>;
}

impl<B> MutableRecordStore for B
where
    B: RecordBackend + Sync,
{
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, public_key, opts)))]
    async fn get_json(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetJsonOptions,
    ) -> Result<JsonData> {
        let hashed = opts.hashed_data_key_hex;
        read_json(self.portal(), public_key, data_key, &opts, |signed| {
            self.observe(public_key, data_key, hashed, signed)
        })
        .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, private_key, json, opts)))]
    async fn set_json(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        json: Value,
        opts: SetJsonOptions,
    ) -> Result<JsonData> {
        let skylink = self
            .write(private_key, data_key, Payload::Json(json.clone()), opts.into())
            .await?;
        Ok(JsonData {
            data: Some(json),
            data_link: skylink.map(|s| s.to_uri()),
        })
    }

    async fn set_data_link(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        data_link: &str,
        opts: SetJsonOptions,
    ) -> Result<()> {
        let payload = Payload::link(data_link)?;
        self.write(private_key, data_key, payload, opts.into())
            .await
            .map(drop)
    }

    async fn get_entry_data(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetEntryOptions,
    ) -> Result<Option<Vec<u8>>> {
        let hashed = opts.hashed_data_key_hex;
        read_entry_data(self.portal(), public_key, data_key, opts, |signed| {
            self.observe(public_key, data_key, hashed, signed)
        })
        .await
    }

    async fn set_entry_data(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        data: Vec<u8>,
        opts: SetEntryOptions,
    ) -> Result<()> {
        let payload = Payload::raw(data)?;
        self.write(private_key, data_key, payload, opts)
            .await
            .map(drop)
    }

    async fn delete_entry_data(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        opts: SetEntryOptions,
    ) -> Result<()> {
        self.write(private_key, data_key, Payload::Delete, opts)
            .await
            .map(drop)
    }

    async fn delete_json(
        &self,
        private_key: &PrivateKey,
        data_key: &str,
        opts: SetJsonOptions,
    ) -> Result<()> {
        self.delete_entry_data(private_key, data_key, opts.into())
            .await
    }

    async fn get_raw_bytes(
        &self,
        public_key: &PublicKey,
        data_key: &str,
        opts: GetJsonOptions,
    ) -> Result<RawBytesData> {
        let hashed = opts.hashed_data_key_hex;
        read_raw(self.portal(), public_key, data_key, &opts, |signed| {
            self.observe(public_key, data_key, hashed, signed)
        })
        .await
    }
}
