use crate::config::{DEFAULT_MAX_BODY_SIZE, ERROR_BODY_PREVIEW_LIMIT};
use crate::error::{BoxError, HttpError};
use crate::options::ResponseOption;
use crate::replay::ReplayBody;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode, Version};
use http_body_util::{BodyExt, Full};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::io;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Type alias for the boxed body produced by a transport.
///
/// For the default transport this is already decompressed (gzip/br/deflate).
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Box a complete in-memory body; used by mock transports.
#[must_use]
pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never: Infallible| -> BoxError { match never {} })
        .boxed()
}

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports two formats per RFC 7231:
/// - Seconds: "120" → 120 seconds
/// - HTTP-date (RFC 1123): "Wed, 21 Oct 2015 07:28:00 GMT" → duration until that time
///
/// Returns `None` if the header is missing, unparsable, or in the past.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds.cast_unsigned()));
    }

    parse_http_date(trimmed)
}

fn parse_http_date(value: &str) -> Option<Duration> {
    let parsed = httpdate::parse_http_date(value).ok()?;
    parsed.duration_since(SystemTime::now()).ok()
}

/// Check that a declared `Content-Type` is JSON.
///
/// A missing or empty header is accepted.
///
/// # Errors
///
/// Returns `HttpError::UnexpectedContentType` for any other media type.
pub fn check_json_content_type(headers: &HeaderMap) -> Result<(), HttpError> {
    let Some(value) = headers.get(http::header::CONTENT_TYPE) else {
        return Ok(());
    };
    let content_type = String::from_utf8_lossy(value.as_bytes());
    if content_type.is_empty() || content_type.starts_with("application/json") {
        Ok(())
    } else {
        Err(HttpError::UnexpectedContentType(content_type.into_owned()))
    }
}

/// HTTP response with a replayable body.
///
/// Every body reader on this type works on the captured bytes, so the body
/// can be decoded, copied and previewed any number of times while the
/// network stream is read only once.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: ReplayBody,
}

impl HttpResponse {
    /// Wrap a transport response, capturing at most `max_body_size` body bytes.
    #[must_use]
    pub fn new(response: Response<ResponseBody>, max_body_size: usize) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body: ReplayBody::new(body, max_body_size),
        }
    }

    /// Build a response around an in-memory body.
    #[must_use]
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let mut response = Response::new(full_body(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Self::new(response, DEFAULT_MAX_BODY_SIZE)
    }

    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP version the transport negotiated
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the response headers, for middleware.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The replayable body.
    #[must_use]
    pub fn body(&self) -> &ReplayBody {
        &self.body
    }

    /// Mutable access to the replayable body, e.g. to read it as `AsyncRead`.
    pub fn body_mut(&mut self) -> &mut ReplayBody {
        &mut self.body
    }

    /// Consume the response and keep only the body.
    #[must_use]
    pub fn into_body(self) -> ReplayBody {
        self.body
    }

    /// Rewind the body to its first byte.
    pub fn reset(&mut self) {
        self.body.reset();
    }

    /// Drop the network source if it is still open.
    pub fn close(&mut self) {
        self.body.close();
    }

    /// Read the whole body.
    ///
    /// Does not check the status and does not move the body cursor.
    ///
    /// # Errors
    /// Returns `HttpError::Transport` if the body cannot be read.
    /// Returns `HttpError::BodyTooLarge` if body exceeds limit.
    pub async fn bytes(&mut self) -> Result<Bytes, HttpError> {
        let captured = self.body.fill().await?;
        Ok(Bytes::copy_from_slice(captured))
    }

    /// Read the whole body as text (UTF-8).
    ///
    /// Invalid UTF-8 sequences are replaced with the Unicode replacement character.
    ///
    /// # Errors
    /// Same as [`bytes`](Self::bytes).
    pub async fn text(&mut self) -> Result<String, HttpError> {
        let captured = self.body.fill().await?;
        Ok(String::from_utf8_lossy(captured).into_owned())
    }

    /// Decode the whole body as JSON.
    ///
    /// A declared `Content-Type` must start with `application/json`; a missing
    /// or empty one is accepted.
    ///
    /// # Errors
    /// Returns `HttpError::UnexpectedContentType` for a non-JSON content type.
    /// Returns `HttpError::Json` if parsing fails.
    /// Returns `HttpError::Transport` or `HttpError::BodyTooLarge` if the body cannot be read.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, HttpError> {
        check_json_content_type(&self.headers)?;
        let captured = self.body.fill().await?;
        Ok(serde_json::from_slice(captured)?)
    }

    /// Copy the whole body into `sink` and flush it.
    ///
    /// The body is rewound before and after the copy, so it can be read again.
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// Returns `HttpError::Sink` if writing to the sink fails, or the body
    /// read error (`Transport`, `BodyTooLarge`) if reading fails.
    pub async fn copy_to<W>(&mut self, sink: &mut W) -> Result<u64, HttpError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.body.reset();
        let copied = tokio::io::copy(&mut self.body, sink).await;
        self.body.reset();
        let written = copied.map_err(split_copy_error)?;
        sink.flush().await.map_err(HttpError::Sink)?;
        Ok(written)
    }

    /// Turn a non-2xx status into `HttpError::HttpStatus`.
    ///
    /// The error carries up to 8 KiB of the body as a lossy UTF-8 preview
    /// and the parsed `Retry-After` header. The body stays replayable.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if the response status is not 2xx.
    pub async fn error_for_status(&mut self) -> Result<(), HttpError> {
        if self.status.is_success() {
            return Ok(());
        }

        let content_type = self
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let retry_after = parse_retry_after(&self.headers);

        // A failed preview read must not hide the status error.
        let body_preview = match self.body.prefetch(ERROR_BODY_PREVIEW_LIMIT).await {
            Ok(captured) => preview(captured),
            Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
            Err(e) => {
                tracing::debug!(error = %e, "failed to read error body preview");
                preview(self.body.captured())
            }
        };

        Err(HttpError::HttpStatus {
            status: self.status,
            body_preview,
            content_type,
            retry_after,
        })
    }

    /// Apply response options in order, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the first option's error.
    pub async fn apply(&mut self, options: Vec<ResponseOption<'_>>) -> Result<(), HttpError> {
        for option in options {
            option.apply(self).await?;
        }
        Ok(())
    }
}

fn preview(captured: &[u8]) -> String {
    let end = captured.len().min(ERROR_BODY_PREVIEW_LIMIT);
    String::from_utf8_lossy(&captured[..end]).into_owned()
}

/// Recover the body error from a failed copy, or report the sink as failing.
fn split_copy_error(err: io::Error) -> HttpError {
    if !err.get_ref().is_some_and(|inner| inner.is::<HttpError>()) {
        return HttpError::Sink(err);
    }
    match err.into_inner().map(|inner| inner.downcast::<HttpError>()) {
        Some(Ok(body_err)) => *body_err,
        Some(Err(other)) => HttpError::Sink(io::Error::other(other)),
        None => HttpError::Sink(io::Error::other("response body read failed")),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, RETRY_AFTER};
    use http_body::Frame;
    use serde::Deserialize;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn response(status: StatusCode, content_type: Option<&str>, body: &'static str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, ct.parse().unwrap());
        }
        HttpResponse::from_bytes(status, headers, body)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        #[serde(rename = "Foo")]
        foo: String,
        #[serde(rename = "Bar")]
        bar: i64,
    }

    #[tokio::test]
    async fn test_json_decodes_and_stays_replayable() {
        let mut resp = response(
            StatusCode::OK,
            Some("application/json; charset=utf-8"),
            r#"{"Foo":"something","Bar":234}"#,
        );

        let first: Payload = resp.json().await.unwrap();
        let second: Payload = resp.json().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.foo, "something");
        assert_eq!(resp.text().await.unwrap(), r#"{"Foo":"something","Bar":234}"#);
    }

    #[tokio::test]
    async fn test_json_accepts_missing_or_empty_content_type() {
        let mut missing = response(StatusCode::OK, None, r#"{"Foo":"a","Bar":1}"#);
        assert!(missing.json::<Payload>().await.is_ok());

        let mut empty = response(StatusCode::OK, Some(""), r#"{"Foo":"a","Bar":1}"#);
        assert!(empty.json::<Payload>().await.is_ok());
    }

    #[tokio::test]
    async fn test_json_rejects_other_content_type() {
        let mut resp = response(StatusCode::OK, Some("text/plain"), "{}");
        let err = resp.json::<serde_json::Value>().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid Content-Type header, expected 'application/json', got text/plain"
        );
    }

    #[tokio::test]
    async fn test_json_parse_error() {
        let mut resp = response(StatusCode::OK, Some("application/json"), "not json");
        let err = resp.json::<serde_json::Value>().await.unwrap_err();
        assert!(matches!(err, HttpError::Json(_)));
    }

    #[tokio::test]
    async fn test_copy_to_rewinds() {
        let mut resp = response(StatusCode::OK, None, "raw payload");

        let mut first = Vec::new();
        let written = resp.copy_to(&mut first).await.unwrap();
        assert_eq!(written, 11);

        let mut second = Vec::new();
        resp.copy_to(&mut second).await.unwrap();
        assert_eq!(first, b"raw payload");
        assert_eq!(first, second);
        assert_eq!(resp.body().position(), 0);
    }

    struct FailingSink;

    impl AsyncWrite for FailingSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_copy_to_sink_error() {
        let mut resp = response(StatusCode::OK, None, "payload");
        let err = resp.copy_to(&mut FailingSink).await.unwrap_err();
        assert!(matches!(err, HttpError::Sink(_)));
        assert_eq!(err.to_string(), "cannot copy response body: disk full");
    }

    #[tokio::test]
    async fn test_copy_to_reports_body_error() {
        let stream = futures_util::stream::iter(vec![
            Ok::<_, BoxError>(Frame::data(Bytes::from_static(b"partial"))),
            Err::<Frame<Bytes>, BoxError>("error reading data".into()),
        ]);
        let body = http_body_util::StreamBody::new(stream).boxed();
        let mut resp = HttpResponse::new(Response::new(body), DEFAULT_MAX_BODY_SIZE);

        let mut sink = Vec::new();
        let err = resp.copy_to(&mut sink).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
        assert_eq!(err.to_string(), "error reading data");
    }

    #[tokio::test]
    async fn test_error_for_status_success_is_ok() {
        let mut resp = response(StatusCode::CREATED, None, "");
        assert!(resp.error_for_status().await.is_ok());
    }

    #[tokio::test]
    async fn test_error_for_status_carries_preview_and_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        headers.insert(RETRY_AFTER, "30".parse().unwrap());
        let mut resp =
            HttpResponse::from_bytes(StatusCode::SERVICE_UNAVAILABLE, headers, "try later");

        match resp.error_for_status().await.unwrap_err() {
            HttpError::HttpStatus {
                status,
                body_preview,
                content_type,
                retry_after,
            } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body_preview, "try later");
                assert_eq!(content_type.as_deref(), Some("text/plain"));
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // The preview did not consume the body.
        assert_eq!(resp.text().await.unwrap(), "try later");
    }

    #[tokio::test]
    async fn test_error_for_status_truncates_preview() {
        let large = "x".repeat(ERROR_BODY_PREVIEW_LIMIT * 2);
        let mut resp = HttpResponse::from_bytes(StatusCode::BAD_GATEWAY, HeaderMap::new(), large);

        match resp.error_for_status().await.unwrap_err() {
            HttpError::HttpStatus { body_preview, .. } => {
                assert_eq!(body_preview.len(), ERROR_BODY_PREVIEW_LIMIT);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_limit_applies_to_readers() {
        let mut resp = HttpResponse::new(Response::new(full_body("0123456789")), 4);
        let err = resp.bytes().await.unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 4, .. }));
    }

    #[tokio::test]
    async fn test_body_limit_fails_every_read() {
        let stream = futures_util::stream::iter(vec![
            Ok::<_, BoxError>(Frame::data(Bytes::from_static(b"12345"))),
            Ok::<_, BoxError>(Frame::data(Bytes::from_static(b"67890"))),
        ]);
        let body = http_body_util::StreamBody::new(stream).boxed();
        let mut resp = HttpResponse::new(Response::new(body), 8);

        for _ in 0..2 {
            let err = resp.bytes().await.unwrap_err();
            assert!(matches!(
                err,
                HttpError::BodyTooLarge {
                    limit: 8,
                    actual: 10
                }
            ));
        }
        assert!(resp.text().await.is_err());
        assert_eq!(resp.body().captured(), b"12345");
    }

    #[tokio::test]
    async fn test_source_error_fails_every_read() {
        let stream = futures_util::stream::iter(vec![
            Ok::<_, BoxError>(Frame::data(Bytes::from_static(br#"{"a":"#))),
            Err::<Frame<Bytes>, BoxError>("connection reset".into()),
        ]);
        let body = http_body_util::StreamBody::new(stream).boxed();
        let mut resp = HttpResponse::new(Response::new(body), DEFAULT_MAX_BODY_SIZE);

        for _ in 0..2 {
            let err = resp.text().await.unwrap_err();
            assert!(matches!(err, HttpError::Transport(_)));
            assert_eq!(err.to_string(), "connection reset");
        }
        let err = resp.json::<serde_json::Value>().await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));

        let mut sink = Vec::new();
        let err = resp.copy_to(&mut sink).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(resp.body().captured(), br#"{"a":"#);
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "  60  ".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_retry_after_invalid_or_negative() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, "not-a-number".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, "-5".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        let future_time = SystemTime::now() + Duration::from_secs(60);
        headers.insert(
            RETRY_AFTER,
            httpdate::fmt_http_date(future_time).parse().unwrap(),
        );
        let duration = parse_retry_after(&headers).unwrap();
        assert!(duration.as_secs() >= 58 && duration.as_secs() <= 62);
    }
}
