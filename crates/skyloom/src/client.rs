//! Portal client
//!
//! [`SkynetClient`] talks to a single Skynet portal over any [`HttpClient`]. It
//! implements the [`BlobStore`] half of the portal API here, and the registry
//! half in [`crate::registry`].

mod multipart;

use std::future::Future;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bon::Builder;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, USER_AGENT};
use http::{HeaderName, HeaderValue, Method, Request};
use serde::Deserialize;
use smol_str::SmolStr;
use url::Url;

use skyloom_common::error::{ClientError, HttpError, TransportError};
use skyloom_common::http_client::HttpClient;
use skyloom_common::types::skylink::{Skylink, URI_SKYNET_PREFIX, trim_uri_prefix};

use crate::error::Result;

/// Portal used when none is configured.
pub const DEFAULT_PORTAL_URL: &str = "https://siasky.net";
/// Upload endpoint path.
pub const DEFAULT_UPLOAD_PATH: &str = "/skynet/skyfile";
/// Registry endpoint path, used for both lookups and writes.
pub const DEFAULT_REGISTRY_PATH: &str = "/skynet/registry";
/// Download endpoint path; the skylink is appended to it.
pub const DEFAULT_DOWNLOAD_PATH: &str = "/";
/// Seconds the portal may spend looking up a registry entry.
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 5;
/// Multipart field name portals expect for single-file uploads.
pub const PORTAL_FILE_FIELDNAME: &str = "file";

/// Response header carrying the skylink of the served content.
pub const SKYNET_SKYLINK_HEADER: &str = "skynet-skylink";

fn default_portal_url() -> Url {
    Url::parse(DEFAULT_PORTAL_URL).expect("default portal URL is valid")
}

/// Client configuration.
///
/// ```
/// use skyloom::client::ClientOptions;
///
/// let opts = ClientOptions::new()
///     .portal_url(url::Url::parse("https://portal.example").unwrap())
///     .api_key("hunter2")
///     .custom_user_agent("Sia-Agent")
///     .build();
/// assert_eq!(opts.registry_timeout_secs, 5);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct ClientOptions {
    /// Base URL of the portal
    #[builder(default = default_portal_url())]
    pub portal_url: Url,
    /// Portal API key, sent as the password of HTTP basic auth with an empty user
    #[builder(into)]
    pub api_key: Option<SmolStr>,
    /// `User-Agent` header override
    #[builder(into)]
    pub custom_user_agent: Option<SmolStr>,
    /// `Cookie` header to send with every request
    #[builder(into)]
    pub custom_cookie: Option<SmolStr>,
    /// Path of the upload endpoint
    #[builder(default = SmolStr::new_static(DEFAULT_UPLOAD_PATH), into)]
    pub endpoint_upload: SmolStr,
    /// Path of the registry endpoint
    #[builder(default = SmolStr::new_static(DEFAULT_REGISTRY_PATH), into)]
    pub endpoint_registry: SmolStr,
    /// Path prefix for downloads
    #[builder(default = SmolStr::new_static(DEFAULT_DOWNLOAD_PATH), into)]
    pub endpoint_download: SmolStr,
    /// Registry lookup timeout passed to the portal, in seconds
    #[builder(default = DEFAULT_REGISTRY_TIMEOUT_SECS)]
    pub registry_timeout_secs: u64,
    /// Additional headers sent with every request
    #[builder(default)]
    pub extra_headers: Vec<(HeaderName, HeaderValue)>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new().build()
    }
}

/// Body returned by the upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    /// Skylink of the uploaded content, without the URI prefix
    pub skylink: String,
    /// Merkle root of the content
    #[serde(default)]
    pub merkleroot: String,
    /// Bitfield of the skylink
    #[serde(default)]
    pub bitfield: u64,
}

/// Content downloaded from the portal.
#[derive(Debug, Clone)]
pub struct BlobResponse {
    /// Raw body
    pub bytes: Bytes,
    /// `Content-Type` of the body, if the portal sent one
    pub content_type: Option<String>,
    /// Skylink the portal claims the body resolves to
    pub skylink_header: Option<String>,
}

impl BlobResponse {
    /// Whether the portal declared the body to be JSON.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
            .unwrap_or(false)
    }
}

/// Immutable content store: upload bytes, get a skylink; fetch by skylink.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait BlobStore {
    /// Upload `data` as a single file and return its skylink.
    fn upload_data(
        &self,
        data: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> impl Future<Output = Result<Skylink>>;

    /// Download the content behind `skylink`, which may carry the `sia://` prefix.
    fn download_data(&self, skylink: &str) -> impl Future<Output = Result<BlobResponse>>;
}

/// Client for a single Skynet portal.
pub struct SkynetClient<C> {
    transport: C,
    options: ClientOptions,
}

impl<C: HttpClient> SkynetClient<C> {
    /// Create a client over `transport` with the given options.
    pub fn new(transport: C, options: ClientOptions) -> Self {
        Self { transport, options }
    }

    /// Client configuration.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Base URL of the portal.
    pub fn portal_url(&self) -> &Url {
        &self.options.portal_url
    }

    /// Access the underlying transport.
    pub fn transport(&self) -> &C {
        &self.transport
    }

    /// Join an endpoint path (and optional trailing segment) onto the portal URL.
    pub(crate) fn make_url(&self, endpoint: &str, extra: &str) -> Url {
        let mut url = self.options.portal_url.clone();
        let mut path = url.path().trim_end_matches('/').to_owned();
        let endpoint = endpoint.trim_matches('/');
        if !endpoint.is_empty() {
            path.push('/');
            path.push_str(endpoint);
        }
        let extra = extra.trim_start_matches('/');
        if !extra.is_empty() {
            path.push('/');
            path.push_str(extra);
        }
        if path.is_empty() {
            path.push('/');
        }
        url.set_path(&path);
        url
    }

    /// Start a request carrying the configured auth, agent, cookie and extra headers.
    pub(crate) fn request(
        &self,
        method: Method,
        url: &Url,
    ) -> core::result::Result<http::request::Builder, TransportError> {
        let mut builder = Request::builder().method(method).uri(url.as_str());

        if let Some(agent) = &self.options.custom_user_agent {
            builder = builder.header(USER_AGENT, header_value(agent)?);
        }
        if let Some(cookie) = &self.options.custom_cookie {
            builder = builder.header(COOKIE, header_value(cookie)?);
        }
        if let Some(key) = &self.options.api_key {
            let credentials = STANDARD.encode(format!(":{key}"));
            builder = builder.header(AUTHORIZATION, header_value(&format!("Basic {credentials}"))?);
        }
        for (name, value) in &self.options.extra_headers {
            builder = builder.header(name, value);
        }
        Ok(builder)
    }

    /// Send a request; transport failures are sorted by the transport's
    /// [`HttpClient::classify_error`].
    pub(crate) async fn execute(
        &self,
        request: Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, ClientError> {
        self.transport
            .send_http(request)
            .await
            .map_err(|e| ClientError::from(C::classify_error(e)))
    }

    /// Send a request and fail on any non-2xx status.
    pub(crate) async fn execute_ok(
        &self,
        request: Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, ClientError> {
        let response = self.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError {
                status,
                body: Some(Bytes::from(response.into_body())),
            }
            .into());
        }
        Ok(response)
    }
}

#[cfg(feature = "reqwest-client")]
impl SkynetClient<reqwest::Client> {
    /// Client for `portal_url` over a default reqwest transport.
    pub fn with_portal(portal_url: Url) -> Self {
        Self::new(
            reqwest::Client::new(),
            ClientOptions::new().portal_url(portal_url).build(),
        )
    }
}

#[cfg(feature = "reqwest-client")]
impl Default for SkynetClient<reqwest::Client> {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), ClientOptions::default())
    }
}

fn header_value(s: &str) -> core::result::Result<HeaderValue, TransportError> {
    HeaderValue::from_str(s)
        .map_err(|e| TransportError::InvalidRequest(format!("invalid header value: {e}")))
}

fn response_header(response: &http::Response<Vec<u8>>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

impl<C: HttpClient + Sync> BlobStore for SkynetClient<C> {
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, data), fields(len = data.len())))]
    async fn upload_data(
        &self,
        data: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<Skylink> {
        let form = multipart::encode(&[multipart::FormFile {
            field: PORTAL_FILE_FIELDNAME,
            filename,
            content_type,
            data: &data,
        }]);
        let url = self.make_url(&self.options.endpoint_upload, "");
        let request = self
            .request(Method::POST, &url)?
            .header(CONTENT_TYPE, header_value(&form.content_type)?)
            .body(form.body)
            .map_err(TransportError::from)?;

        let response = self.execute_ok(request).await?;
        let body: UploadResponse = serde_json::from_slice(response.body())
            .map_err(|e| ClientError::Decode(e.into()))?;
        let skylink = Skylink::parse(&body.skylink)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%skylink, "uploaded blob");

        Ok(skylink)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    async fn download_data(&self, skylink: &str) -> Result<BlobResponse> {
        let skylink = trim_uri_prefix(skylink, URI_SKYNET_PREFIX);
        let url = self.make_url(&self.options.endpoint_download, skylink);
        let request = self
            .request(Method::GET, &url)?
            .body(Vec::new())
            .map_err(TransportError::from)?;

        let response = self.execute_ok(request).await?;
        let content_type = response_header(&response, CONTENT_TYPE.as_str());
        let skylink_header = response_header(&response, SKYNET_SKYLINK_HEADER);

        Ok(BlobResponse {
            bytes: Bytes::from(response.into_body()),
            content_type,
            skylink_header,
        })
    }
}
