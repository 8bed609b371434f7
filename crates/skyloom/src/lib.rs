//! # Skyloom
//!
//! Client for Skynet portals: upload and download blobs, read and write
//! signed registry entries, and keep mutable JSON records ("SkyDB") on top of
//! both without two writers in one process clobbering each other.
//!
//! ## Example
//!
//! ```no_run
//! use skyloom::client::{ClientOptions, SkynetClient};
//! use skyloom::skydb::{GetJsonOptions, MutableRecordStore, SetJsonOptions, SkyDbV2};
//! use skyloom::types::crypto::gen_key_pair_from_seed;
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let client = SkynetClient::new(reqwest::Client::new(), ClientOptions::default());
//!     let db = SkyDbV2::new(client);
//!     let keys = gen_key_pair_from_seed("this seed should be fairly long for security");
//!
//!     let written = db
//!         .set_json(
//!             &keys.private_key,
//!             "app",
//!             serde_json::json!({ "example": "hi" }),
//!             SetJsonOptions::default(),
//!         )
//!         .await?;
//!     println!("stored at {:?}", written.data_link);
//!
//!     let read = db
//!         .get_json(&keys.public_key, "app", GetJsonOptions::default())
//!         .await?;
//!     assert_eq!(read.data, written.data);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! [`skydb::SkyDbV2`] keeps a per-key revision cache. A write holds its key's
//! lock from revision selection through upload and registry submission; any
//! other write to that key in the meantime fails with
//! [`error::SkyDbError::ConcurrentAccess`] rather than waiting. Reads never
//! wait on writes. Across processes the portal is the arbiter: it rejects
//! registry writes whose revision is not higher than the stored one.

#![warn(missing_docs)]

/// Portal client and blob store
pub mod client;
pub mod error;
pub mod registry;
pub mod revision_cache;
pub mod skydb;

pub use skyloom_common::*;

pub use client::{ClientOptions, SkynetClient};
pub use error::SkyDbError;
