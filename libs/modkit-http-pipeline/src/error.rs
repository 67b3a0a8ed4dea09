use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::response::HttpResponse;

/// Boxed cause carried by transport-level errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// HTTP pipeline error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// The owning client failed to build; every request it creates fails with this
    #[error("client error: {0}")]
    Client(#[source] Arc<HttpError>),

    /// A request option failed while the request was being built
    #[error("request error: {0}")]
    Request(#[source] Box<HttpError>),

    /// Every failure collected while building a request
    #[error(transparent)]
    Group(#[from] ErrorGroup),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid URL (failed to parse or not usable for a request)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme for the transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },

    /// A path option was used without an absolute base URL carrying a host
    #[error("cannot use path option because there's no base url")]
    MissingBaseUrl,

    /// The request body could not be serialized
    #[error("cannot encode request body: {0}")]
    EncodeBody(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// JSON decoding was requested but the response declared another media type
    #[error("invalid Content-Type header, expected 'application/json', got {0}")]
    UnexpectedContentType(String),

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing the response body to a sink failed
    #[error("cannot copy response body: {0}")]
    Sink(#[source] std::io::Error),

    /// Single request attempt timed out inside the transport
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc), reported verbatim
    #[error("{0}")]
    Transport(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
        /// Parsed `Retry-After` header value, if present and valid
        retry_after: Option<Duration>,
    },
}

impl HttpError {
    /// Wrap a request-building failure.
    pub(crate) fn request(err: HttpError) -> Self {
        HttpError::Request(Box::new(err))
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

/// All failures collected while building a request.
///
/// Displays as its first error, which is also its `source()`; the rest stay
/// reachable through [`ErrorGroup::errors`].
#[derive(Debug)]
pub struct ErrorGroup {
    errors: Vec<HttpError>,
}

impl ErrorGroup {
    /// Group the given errors, or `None` when there are none.
    #[must_use]
    pub fn from_errors(errors: Vec<HttpError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    /// The first collected error.
    #[must_use]
    pub fn first(&self) -> &HttpError {
        &self.errors[0]
    }

    /// Every collected error in application order.
    #[must_use]
    pub fn errors(&self) -> &[HttpError] {
        &self.errors
    }

    /// Number of collected errors (never zero).
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always `false`; a group holds at least one error.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.first(), f)
    }
}

impl std::error::Error for ErrorGroup {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.first())
    }
}

/// Failure returned by [`Request::send`](crate::Request::send).
///
/// When the failure happened after the transport answered (a middleware or
/// response option failed), the partially processed response is kept so its
/// status and headers stay inspectable.
#[derive(Debug)]
pub struct SendError {
    error: HttpError,
    response: Option<Box<HttpResponse>>,
}

impl SendError {
    pub(crate) fn new(error: HttpError) -> Self {
        Self {
            error,
            response: None,
        }
    }

    pub(crate) fn with_response(error: HttpError, response: HttpResponse) -> Self {
        Self {
            error,
            response: Some(Box::new(response)),
        }
    }

    /// The underlying error.
    #[must_use]
    pub fn error(&self) -> &HttpError {
        &self.error
    }

    /// The response, if the transport produced one before the failure.
    #[must_use]
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_deref()
    }

    /// Split into the error and the partial response.
    #[must_use]
    pub fn into_parts(self) -> (HttpError, Option<HttpResponse>) {
        (self.error, self.response.map(|r| *r))
    }

    /// Drop the partial response and keep the error.
    #[must_use]
    pub fn into_error(self) -> HttpError {
        self.error
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl From<HttpError> for SendError {
    fn from(error: HttpError) -> Self {
        Self::new(error)
    }
}

impl From<SendError> for HttpError {
    fn from(err: SendError) -> Self {
        err.error
    }
}
