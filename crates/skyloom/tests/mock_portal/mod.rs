#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use skyloom::client::{ClientOptions, SkynetClient};
use skyloom::http_client::HttpClient;
use skyloom::types::crypto::{PublicKey, hash_all};
use skyloom::types::registry::{SignedRegistryEntry, data_key_bytes};
use skyloom::types::skylink::Skylink;
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
pub struct StoredEntry {
    pub data: Vec<u8>,
    pub revision: u64,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct StoredBlob {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct PortalState {
    blobs: HashMap<Skylink, StoredBlob>,
    // keyed by (public key hex, hashed data key hex)
    entries: HashMap<(String, String), StoredEntry>,
    log: Vec<(Method, String)>,
    reject_next_write: bool,
}

/// In-memory portal: stores uploads and registry entries, enforces strictly
/// increasing revisions, and logs every request.
#[derive(Clone, Default)]
pub struct MockPortal {
    state: Arc<Mutex<PortalState>>,
}

impl MockPortal {
    pub fn client(&self) -> SkynetClient<MockPortal> {
        SkynetClient::new(
            self.clone(),
            ClientOptions::new()
                .portal_url(url::Url::parse("https://portal.test").unwrap())
                .build(),
        )
    }

    /// Requests seen so far, as (method, path).
    pub async fn log(&self) -> Vec<(Method, String)> {
        self.state.lock().await.log.clone()
    }

    pub async fn clear_log(&self) {
        self.state.lock().await.log.clear();
    }

    pub async fn uploads(&self) -> usize {
        self.state
            .lock()
            .await
            .log
            .iter()
            .filter(|(m, p)| *m == Method::POST && p == "/skynet/skyfile")
            .count()
    }

    pub async fn downloads(&self) -> usize {
        self.state
            .lock()
            .await
            .log
            .iter()
            .filter(|(m, p)| *m == Method::GET && !p.starts_with("/skynet/"))
            .count()
    }

    pub async fn reject_next_write(&self) {
        self.state.lock().await.reject_next_write = true;
    }

    pub async fn entry(&self, public_key: &PublicKey, data_key: &str) -> Option<StoredEntry> {
        let key = (
            public_key.to_hex(),
            hex::encode(data_key_bytes(data_key, false).unwrap()),
        );
        self.state.lock().await.entries.get(&key).cloned()
    }

    /// Overwrite an entry directly, bypassing revision checks.
    pub async fn put_entry(&self, public_key: &PublicKey, signed: &SignedRegistryEntry) {
        let key = (
            public_key.to_hex(),
            hex::encode(data_key_bytes(&signed.entry.data_key, false).unwrap()),
        );
        self.state.lock().await.entries.insert(
            key,
            StoredEntry {
                data: signed.entry.data.clone(),
                revision: signed.entry.revision,
                signature: signed.signature.as_bytes().to_vec(),
            },
        );
    }

    /// Store a blob directly and return its skylink.
    pub async fn put_blob(&self, content_type: &str, data: &[u8]) -> Skylink {
        let skylink = skylink_for(data);
        self.state.lock().await.blobs.insert(
            skylink,
            StoredBlob {
                filename: "blob".into(),
                content_type: content_type.into(),
                data: data.to_vec(),
            },
        );
        skylink
    }

    pub async fn blob(&self, skylink: &Skylink) -> Option<StoredBlob> {
        self.state.lock().await.blobs.get(skylink).cloned()
    }

    async fn handle(&self, request: http::Request<Vec<u8>>) -> http::Response<Vec<u8>> {
        let method = request.method().clone();
        let path = request.uri().path().to_owned();
        let mut state = self.state.lock().await;
        state.log.push((method.clone(), path.clone()));

        match (method.as_str(), path.as_str()) {
            ("POST", "/skynet/skyfile") => {
                let Some(blob) = parse_upload(&request) else {
                    return respond(StatusCode::BAD_REQUEST, b"bad form".to_vec());
                };
                let skylink = skylink_for(&blob.data);
                state.blobs.insert(skylink, blob);
                let body = serde_json::json!({
                    "skylink": skylink.to_base64(),
                    "merkleroot": "00",
                    "bitfield": 0,
                });
                respond(StatusCode::OK, serde_json::to_vec(&body).unwrap())
            }
            ("GET", "/skynet/registry") => {
                let query = request.uri().query().unwrap_or_default();
                let params: HashMap<&str, &str> =
                    query.split('&').filter_map(|kv| kv.split_once('=')).collect();
                let pk = params["publickey"].trim_start_matches("ed25519:").to_owned();
                let dk = params["datakey"].to_owned();
                match state.entries.get(&(pk, dk)) {
                    None => respond(StatusCode::NOT_FOUND, Vec::new()),
                    Some(entry) => {
                        let body = serde_json::json!({
                            "data": hex::encode(&entry.data),
                            "revision": entry.revision,
                            "signature": hex::encode(&entry.signature),
                        });
                        respond(StatusCode::OK, serde_json::to_vec(&body).unwrap())
                    }
                }
            }
            ("POST", "/skynet/registry") => {
                if std::mem::take(&mut state.reject_next_write) {
                    return respond(StatusCode::BAD_REQUEST, b"simulated rejection".to_vec());
                }
                let body: serde_json::Value = serde_json::from_slice(request.body()).unwrap();
                let key_bytes: Vec<u8> =
                    serde_json::from_value(body["publickey"]["key"].clone()).unwrap();
                let key = (
                    hex::encode(key_bytes),
                    body["datakey"].as_str().unwrap().to_owned(),
                );
                let revision = body["revision"].as_u64().unwrap();
                if let Some(existing) = state.entries.get(&key) {
                    if existing.revision >= revision {
                        return respond(
                            StatusCode::BAD_REQUEST,
                            b"revision number too low".to_vec(),
                        );
                    }
                }
                let entry = StoredEntry {
                    data: serde_json::from_value(body["data"].clone()).unwrap(),
                    revision,
                    signature: serde_json::from_value(body["signature"].clone()).unwrap(),
                };
                state.entries.insert(key, entry);
                respond(StatusCode::NO_CONTENT, Vec::new())
            }
            ("GET", p) => {
                let Ok(skylink) = Skylink::parse(p.trim_start_matches('/')) else {
                    return respond(StatusCode::BAD_REQUEST, Vec::new());
                };
                match state.blobs.get(&skylink) {
                    None => respond(StatusCode::NOT_FOUND, Vec::new()),
                    Some(blob) => {
                        let mut resp = respond(StatusCode::OK, blob.data.clone());
                        let headers = resp.headers_mut();
                        headers.insert(
                            http::header::CONTENT_TYPE,
                            blob.content_type.parse().unwrap(),
                        );
                        headers.insert("skynet-skylink", skylink.to_base64().parse().unwrap());
                        resp
                    }
                }
            }
            _ => respond(StatusCode::NOT_FOUND, Vec::new()),
        }
    }
}

impl HttpClient for MockPortal {
    type Error = std::convert::Infallible;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let portal = self.clone();
        async move {
            // Every request is a suspension point, as over a real network.
            tokio::task::yield_now().await;
            Ok(portal.handle(request).await)
        }
    }
}

fn respond(status: StatusCode, body: Vec<u8>) -> http::Response<Vec<u8>> {
    let mut resp = http::Response::new(body);
    *resp.status_mut() = status;
    resp
}

fn skylink_for(data: &[u8]) -> Skylink {
    let digest = hash_all([data]);
    let mut raw = [0u8; 34];
    raw[0] = 0x01;
    raw[2..].copy_from_slice(&digest);
    Skylink::from_raw(raw)
}

fn parse_upload(request: &http::Request<Vec<u8>>) -> Option<StoredBlob> {
    let content_type = request
        .headers()
        .get(http::header::CONTENT_TYPE)?
        .to_str()
        .ok()?;
    let boundary = content_type.split_once("boundary=")?.1;
    let body = request.body();
    let header_end = find(body, b"\r\n\r\n")?;
    let headers = std::str::from_utf8(&body[..header_end]).ok()?;
    let closing = format!("\r\n--{boundary}--");
    let data_start = header_end + 4;
    let data_end = find(body, closing.as_bytes())?;

    let part_type = headers
        .lines()
        .find_map(|l| l.strip_prefix("Content-Type: "))?
        .to_owned();
    let filename = headers
        .split_once("filename=\"")?
        .1
        .split_once('"')?
        .0
        .to_owned();

    Some(StoredBlob {
        filename,
        content_type: part_type,
        data: body[data_start..data_end].to_vec(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
