use crate::error::HttpError;
use crate::request::Request;
use crate::target::RequestUrl;
use bytes::Bytes;
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Custom request-building step.
pub type RequestFn = Arc<dyn Fn(&mut Request) -> Result<(), HttpError> + Send + Sync>;

type EncodeError = Arc<dyn StdError + Send + Sync>;

/// A request body serialized when the option was created.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    content_type: &'static str,
    bytes: Result<Bytes, EncodeError>,
}

impl EncodedBody {
    fn new<E>(content_type: &'static str, encoded: Result<Vec<u8>, E>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            content_type,
            bytes: encoded
                .map(Bytes::from)
                .map_err(|e| Arc::new(e) as EncodeError),
        }
    }

    /// Media type sent with the body.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }
}

/// One step of building a request.
#[derive(Clone)]
#[non_exhaustive]
pub enum RequestOption {
    /// Parse and set the URL; relative references resolve against the client base URL
    Url(String),
    /// Set an already parsed URL
    ParsedUrl(Url),
    /// Append values for a header
    Header { name: String, values: Vec<String> },
    /// Append path segments to an absolute URL
    Path(Vec<String>),
    /// Add query parameters
    Query(Vec<(String, String)>),
    /// Set the raw body
    Body(Bytes),
    /// Set a serialized body and its `Content-Type`
    Encoded(EncodedBody),
    /// Arbitrary step
    Custom(RequestFn),
}

impl RequestOption {
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    #[must_use]
    pub fn parsed_url(url: Url) -> Self {
        Self::ParsedUrl(url)
    }

    #[must_use]
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Header {
            name: name.into(),
            values: vec![value.into()],
        }
    }

    #[must_use]
    pub fn header_values<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::Header {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Path(segments.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn query<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Query(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Add one query parameter with possibly several values.
    #[must_use]
    pub fn param<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let key = key.into();
        Self::Query(
            values
                .into_iter()
                .map(|v| (key.clone(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self::Body(body.into())
    }

    /// JSON body with `Content-Type: application/json`.
    ///
    /// The value is serialized right away; a serialization failure surfaces
    /// when the option is applied.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::Encoded(EncodedBody::new(
            "application/json",
            serde_json::to_vec(value),
        ))
    }

    /// Form body with `Content-Type: application/x-www-form-urlencoded`.
    #[must_use]
    pub fn form<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::Encoded(EncodedBody::new(
            "application/x-www-form-urlencoded",
            serde_urlencoded::to_string(value).map(String::into_bytes),
        ))
    }

    #[must_use]
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut Request) -> Result<(), HttpError> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Apply this option to a request under construction.
    ///
    /// # Errors
    ///
    /// Returns the option's failure; the request may have been partially
    /// modified only by options that succeed in several steps (`Encoded`).
    pub fn apply(&self, request: &mut Request) -> Result<(), HttpError> {
        match self {
            Self::Url(raw) => {
                let url = request.client().base_url().resolve(raw)?;
                *request.url_mut() = url;
                Ok(())
            }
            Self::ParsedUrl(url) => {
                *request.url_mut() = RequestUrl::Absolute(url.clone());
                Ok(())
            }
            Self::Header { name, values } => {
                super::append_header(request.headers_mut(), name, values)
            }
            Self::Path(segments) => request.url_mut().append_path(segments.as_slice()),
            Self::Query(pairs) => {
                request.url_mut().append_query(pairs.as_slice());
                Ok(())
            }
            Self::Body(bytes) => {
                request.set_body(bytes.clone());
                Ok(())
            }
            Self::Encoded(encoded) => match &encoded.bytes {
                Ok(bytes) => {
                    Self::Body(bytes.clone()).apply(request)?;
                    Self::header(http::header::CONTENT_TYPE.as_str(), encoded.content_type)
                        .apply(request)
                }
                Err(cause) => Err(HttpError::EncodeBody(Arc::clone(cause))),
            },
            Self::Custom(f) => f(request),
        }
    }
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::ParsedUrl(url) => f.debug_tuple("ParsedUrl").field(&url.as_str()).finish(),
            Self::Header { name, values } => f
                .debug_struct("Header")
                .field("name", name)
                .field("values", values)
                .finish(),
            Self::Path(segments) => f.debug_tuple("Path").field(segments).finish(),
            Self::Query(pairs) => f.debug_tuple("Query").field(pairs).finish(),
            Self::Body(bytes) => f.debug_tuple("Body").field(&bytes.len()).finish(),
            Self::Encoded(encoded) => f.debug_tuple("Encoded").field(encoded).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
