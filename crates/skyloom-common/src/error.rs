//! Errors from talking to a portal
//!
//! [`ClientError`] is what a portal call returns before any Skynet-level
//! interpretation: the request never completed ([`TransportError`]), the body
//! could not be read ([`DecodeError`]), or the portal answered with a non-2xx
//! status ([`HttpError`]).

use bytes::Bytes;

/// Failure of a single portal request
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClientError {
    /// The request did not complete
    #[error("HTTP transport error: {0}")]
    Transport(
        #[from]
        #[diagnostic_source]
        TransportError,
    ),

    /// The portal's response body was not what we expected
    #[error("{0}")]
    Decode(
        #[from]
        #[diagnostic_source]
        DecodeError,
    ),

    /// The portal answered with an error status
    #[error("{0}")]
    Http(
        #[from]
        #[diagnostic_source]
        HttpError,
    ),
}

/// Why a request never produced a response.
///
/// Transports sort their own errors into these through
/// [`HttpClient::classify_error`](crate::http_client::HttpClient::classify_error).
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TransportError {
    /// The portal could not be reached
    #[error("could not connect to portal: {0}")]
    #[diagnostic(
        code(skyloom::transport::connect),
        help("check the portal URL and your network connection")
    )]
    Connect(String),

    /// The request timed out
    #[error("portal request timed out")]
    #[diagnostic(
        code(skyloom::transport::timeout),
        help("the portal may be overloaded; retry later or use another portal")
    )]
    Timeout,

    /// The request could not be built (bad URI, header value, ...)
    #[error("invalid request: {0}")]
    #[diagnostic(code(skyloom::transport::invalid_request))]
    InvalidRequest(String),

    /// Anything the transport did not classify
    #[error("transport error: {0}")]
    #[diagnostic(code(skyloom::transport::other))]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// A response body that could not be interpreted
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DecodeError {
    /// Body was not the expected JSON
    #[error("failed to deserialize portal response: {0}")]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),
    /// A field parsed as JSON but had the wrong shape
    #[error("unexpected value for response field '{field}': {reason}")]
    Field {
        /// Name of the offending field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

/// Non-2xx portal response
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct HttpError {
    /// Status the portal returned
    pub status: http::StatusCode,
    /// Response body, if any
    pub body: Option<Bytes>,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "portal returned {}", self.status)?;
        if let Some(text) = self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok()) {
            if !text.is_empty() {
                write!(f, ": {text}")?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "reqwest-client")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() || e.is_request() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Other(Box::new(e))
        }
    }
}

impl From<http::Error> for TransportError {
    fn from(e: http::Error) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}
