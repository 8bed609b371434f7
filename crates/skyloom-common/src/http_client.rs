//! Transport seam for portal calls.
//!
//! Portal clients are generic over [`HttpClient`] so tests can swap in an
//! in-memory portal and wasm builds can bring their own fetch-based client.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::error::TransportError;

/// Sends one buffered HTTP request to a portal and returns the buffered response.
///
/// Implementations report only transport failures as errors; non-2xx
/// statuses come back as ordinary responses for the caller to interpret.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait HttpClient {
    /// Transport error
    type Error: std::error::Error + Display + Send + Sync + 'static;

    /// Send `request` and wait for the full response body.
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>>;

    /// Sort a failure from [`send_http`](Self::send_http) into a [`TransportError`].
    ///
    /// The default keeps it opaque as [`TransportError::Other`].
    fn classify_error(error: Self::Error) -> TransportError {
        TransportError::Other(Box::new(error))
    }
}

#[cfg(feature = "reqwest-client")]
impl HttpClient for reqwest::Client {
    type Error = reqwest::Error;

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all, fields(method = %request.method(), uri = %request.uri())))]
    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        let request = reqwest::Request::try_from(request)?;
        let resp = self.execute(request).await?;

        let mut response = http::Response::new(Vec::new());
        *response.status_mut() = resp.status();
        *response.version_mut() = resp.version();
        *response.headers_mut() = resp.headers().clone();
        *response.body_mut() = resp.bytes().await?.to_vec();

        #[cfg(feature = "tracing")]
        tracing::trace!(status = %response.status(), len = response.body().len(), "portal responded");

        Ok(response)
    }

    fn classify_error(error: Self::Error) -> TransportError {
        TransportError::from(error)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl<T: HttpClient + Sync> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> + Send
    {
        self.as_ref().send_http(request)
    }

    fn classify_error(error: Self::Error) -> TransportError {
        T::classify_error(error)
    }
}

#[cfg(target_arch = "wasm32")]
impl<T: HttpClient> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> {
        self.as_ref().send_http(request)
    }

    fn classify_error(error: Self::Error) -> TransportError {
        T::classify_error(error)
    }
}
