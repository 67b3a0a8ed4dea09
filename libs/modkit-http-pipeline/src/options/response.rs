use crate::error::HttpError;
use crate::response::{HttpResponse, check_json_content_type};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWrite;

/// Custom response inspection step.
pub type InspectFn = Arc<dyn Fn(&mut HttpResponse) -> Result<(), HttpError> + Send + Sync>;

type JsonDecoder<'a> = Box<dyn FnOnce(&[u8]) -> Result<(), serde_json::Error> + Send + 'a>;

/// Reusable response step, stored on a client.
#[derive(Clone)]
#[non_exhaustive]
pub enum ResponseMiddleware {
    /// Fail unless a declared `Content-Type` is JSON
    ExpectJson,
    /// Fail with `HttpError::HttpStatus` on non-2xx statuses
    ErrorForStatus,
    /// Arbitrary check or mutation
    Inspect(InspectFn),
}

impl ResponseMiddleware {
    #[must_use]
    pub fn inspect<F>(f: F) -> Self
    where
        F: Fn(&mut HttpResponse) -> Result<(), HttpError> + Send + Sync + 'static,
    {
        Self::Inspect(Arc::new(f))
    }

    /// Run this step against a response.
    ///
    /// # Errors
    ///
    /// Returns the step's failure.
    pub async fn apply(&self, response: &mut HttpResponse) -> Result<(), HttpError> {
        match self {
            Self::ExpectJson => check_json_content_type(response.headers()),
            Self::ErrorForStatus => response.error_for_status().await,
            Self::Inspect(f) => f(response),
        }
    }
}

impl fmt::Debug for ResponseMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectJson => f.write_str("ExpectJson"),
            Self::ErrorForStatus => f.write_str("ErrorForStatus"),
            Self::Inspect(_) => f.write_str("Inspect(..)"),
        }
    }
}

/// Per-call response step; borrows its target and runs at most once.
#[non_exhaustive]
pub enum ResponseOption<'a> {
    /// Decode the body as JSON into a caller-owned value
    Json(JsonDecoder<'a>),
    /// Copy the raw body into a sink
    CopyTo(&'a mut (dyn AsyncWrite + Unpin + Send)),
    /// Run a reusable middleware step for this call only
    Middleware(ResponseMiddleware),
}

impl<'a> ResponseOption<'a> {
    /// Decode the whole body into `target`.
    ///
    /// A declared `Content-Type` must start with `application/json`.
    #[must_use]
    pub fn json<T>(target: &'a mut T) -> Self
    where
        T: DeserializeOwned + Send,
    {
        Self::Json(Box::new(move |bytes: &[u8]| {
            *target = serde_json::from_slice(bytes)?;
            Ok(())
        }))
    }

    #[must_use]
    pub fn copy_to<W>(sink: &'a mut W) -> Self
    where
        W: AsyncWrite + Unpin + Send,
    {
        Self::CopyTo(sink)
    }

    pub(crate) async fn apply(self, response: &mut HttpResponse) -> Result<(), HttpError> {
        match self {
            Self::Json(decode) => {
                check_json_content_type(response.headers())?;
                let captured = response.body_mut().fill().await?;
                decode(captured)?;
                Ok(())
            }
            Self::CopyTo(sink) => response.copy_to(sink).await.map(|_| ()),
            Self::Middleware(middleware) => middleware.apply(response).await,
        }
    }
}

impl From<ResponseMiddleware> for ResponseOption<'_> {
    fn from(middleware: ResponseMiddleware) -> Self {
        Self::Middleware(middleware)
    }
}

impl fmt::Debug for ResponseOption<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(_) => f.write_str("Json(..)"),
            Self::CopyTo(_) => f.write_str("CopyTo(..)"),
            Self::Middleware(m) => f.debug_tuple("Middleware").field(m).finish(),
        }
    }
}
