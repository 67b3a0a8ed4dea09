use crate::config::DEFAULT_MAX_BODY_SIZE;
use crate::error::HttpError;
use crate::options::{ClientOption, RequestOption, ResponseMiddleware};
use crate::request::Request;
use crate::target::RequestUrl;
use crate::transport::Transport;
use http::{HeaderMap, Method};
use std::fmt;
use std::sync::Arc;

/// Configuration shared by every request of a client.
#[derive(Clone)]
pub struct ClientState {
    pub(crate) base_url: RequestUrl,
    pub(crate) base_headers: HeaderMap,
    pub(crate) transport: Option<Transport>,
    pub(crate) max_body_size: usize,
    pub(crate) pre_request: Vec<RequestOption>,
    pub(crate) post_request: Vec<RequestOption>,
    pub(crate) pre_response: Vec<ResponseMiddleware>,
    pub(crate) post_response: Vec<ResponseMiddleware>,
    pub(crate) error: Option<Arc<HttpError>>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            base_url: RequestUrl::Unset,
            base_headers: HeaderMap::new(),
            transport: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            pre_request: Vec::new(),
            post_request: Vec::new(),
            pre_response: Vec::new(),
            post_response: Vec::new(),
            error: None,
        }
    }
}

/// Immutable HTTP client configuration.
///
/// Cloning is cheap and every clone shares the same state. Deriving a
/// variant with [`with`](Client::with) copies the state and never changes
/// the original.
///
/// A client option that fails does not panic or return early: the error is
/// stored and every request created from the client fails with
/// `client error: <cause>`.
///
/// # Example
///
/// ```ignore
/// use modkit_http_pipeline::{Client, ClientOption, RequestOption, ResponseMiddleware};
///
/// let api = Client::new(&[
///     ClientOption::base_url("https://api.example.com/v1"),
///     ClientOption::header("accept", "application/json"),
///     ClientOption::post_response([ResponseMiddleware::ErrorForStatus]),
/// ]);
/// let admin = api.with(&[ClientOption::header("authorization", "Bearer token")]);
///
/// let resp = admin.get(&[RequestOption::path(["users"])]).send().await?;
/// ```
#[derive(Clone, Default)]
pub struct Client {
    inner: Arc<ClientState>,
}

impl Client {
    /// Create a client from options applied in order.
    #[must_use]
    pub fn new(options: &[ClientOption]) -> Self {
        Self::default().with(options)
    }

    /// Derive a client with additional options.
    ///
    /// A client that already carries an error is returned as is.
    #[must_use]
    pub fn with(&self, options: &[ClientOption]) -> Self {
        if self.inner.error.is_some() {
            return self.clone();
        }

        let mut state = ClientState::clone(&self.inner);
        for option in options {
            if let Err(e) = option.apply(&mut state) {
                tracing::debug!(error = %e, "client option failed");
                state.error = Some(Arc::new(e));
                break;
            }
        }
        Self {
            inner: Arc::new(state),
        }
    }

    /// The error of the first failed client option, if any.
    #[must_use]
    pub fn error(&self) -> Option<&HttpError> {
        self.inner.error.as_deref()
    }

    /// Base URL that relative request URLs resolve against.
    #[must_use]
    pub fn base_url(&self) -> &RequestUrl {
        &self.inner.base_url
    }

    /// Headers copied into every new request.
    #[must_use]
    pub fn base_headers(&self) -> &HeaderMap {
        &self.inner.base_headers
    }

    /// Cap on captured response body bytes.
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.inner.max_body_size
    }

    pub(crate) fn pre_request(&self) -> &[RequestOption] {
        &self.inner.pre_request
    }

    pub(crate) fn post_request(&self) -> &[RequestOption] {
        &self.inner.post_request
    }

    pub(crate) fn pre_response(&self) -> &[ResponseMiddleware] {
        &self.inner.pre_response
    }

    pub(crate) fn post_response(&self) -> &[ResponseMiddleware] {
        &self.inner.post_response
    }

    /// The configured transport, or the shared default.
    pub(crate) fn transport(&self) -> Result<Transport, HttpError> {
        match &self.inner.transport {
            Some(transport) => Ok(transport.clone()),
            None => Transport::shared(),
        }
    }

    /// Create a request.
    ///
    /// `options` run in order. The first failure is kept as the request's
    /// pending error and the remaining options are skipped. Request
    /// middleware runs later, when the request is sent.
    pub fn new_request(&self, method: Method, options: &[RequestOption]) -> Request {
        if let Some(err) = &self.inner.error {
            return Request::failed(self.clone(), method, HttpError::Client(Arc::clone(err)));
        }

        let mut request = Request::new(self.clone(), method);
        request.apply_all(options);
        request
    }

    /// Like [`new_request`](Self::new_request), but applies every option and
    /// keeps all failures in an [`ErrorGroup`](crate::ErrorGroup).
    pub fn new_request_collecting(&self, method: Method, options: &[RequestOption]) -> Request {
        if let Some(err) = &self.inner.error {
            return Request::failed(self.clone(), method, HttpError::Client(Arc::clone(err)));
        }

        let mut request = Request::new(self.clone(), method);
        request.apply_collecting(options);
        request
    }

    /// Shortcut for a `GET` request.
    pub fn get(&self, options: &[RequestOption]) -> Request {
        self.new_request(Method::GET, options)
    }

    /// Shortcut for a `POST` request.
    pub fn post(&self, options: &[RequestOption]) -> Request {
        self.new_request(Method::POST, options)
    }

    /// Shortcut for a `PUT` request.
    pub fn put(&self, options: &[RequestOption]) -> Request {
        self.new_request(Method::PUT, options)
    }

    /// Shortcut for a `PATCH` request.
    pub fn patch(&self, options: &[RequestOption]) -> Request {
        self.new_request(Method::PATCH, options)
    }

    /// Shortcut for a `DELETE` request.
    pub fn delete(&self, options: &[RequestOption]) -> Request {
        self.new_request(Method::DELETE, options)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = &self.inner;
        f.debug_struct("Client")
            .field("base_url", &state.base_url.to_string())
            .field("base_headers", &state.base_headers)
            .field("transport", &state.transport)
            .field("max_body_size", &state.max_body_size)
            .field("pre_request", &state.pre_request.len())
            .field("post_request", &state.post_request.len())
            .field("pre_response", &state.pre_response.len())
            .field("post_response", &state.post_response.len())
            .field("error", &state.error)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::options::ResponseOption;
    use crate::response::full_body;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    fn echo_headers() -> Transport {
        Transport::from_fn(|req: http::Request<Full<Bytes>>| async move {
            let mut names: Vec<String> = req
                .headers()
                .iter()
                .map(|(k, v)| format!("{k}={}", v.to_str().unwrap_or_default()))
                .collect();
            names.push(format!("{} {}", req.method(), req.uri()));
            let response = http::Response::builder()
                .status(StatusCode::OK)
                .body(full_body(names.join("\n")))?;
            Ok::<_, HttpError>(response)
        })
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Client>();
    }

    #[test]
    fn test_with_does_not_mutate_original() {
        let base = Client::new(&[
            ClientOption::base_url("https://example.com/api"),
            ClientOption::header("x-a", "1"),
        ]);
        let derived = base.with(&[
            ClientOption::base_url("https://other.example.com"),
            ClientOption::header("x-a", "2"),
            ClientOption::max_body_size(16),
        ]);

        assert_eq!(base.base_url().to_string(), "https://example.com/api");
        assert_eq!(base.base_headers().get_all("x-a").iter().count(), 1);
        assert_eq!(base.max_body_size(), DEFAULT_MAX_BODY_SIZE);

        assert_eq!(derived.base_url().to_string(), "https://other.example.com/");
        let values: Vec<_> = derived.base_headers().get_all("x-a").iter().collect();
        assert_eq!(values, ["1", "2"]);
        assert_eq!(derived.max_body_size(), 16);
    }

    #[test]
    fn test_with_on_errored_client_returns_same_client() {
        let broken = Client::new(&[ClientOption::base_url(":invalid-url")]);
        assert!(broken.error().is_some());

        let derived = broken.with(&[ClientOption::base_url("https://example.com")]);
        assert!(Arc::ptr_eq(&broken.inner, &derived.inner));
        assert!(derived.error().is_some());
    }

    #[test]
    fn test_first_client_error_stops_options() {
        let client = Client::new(&[
            ClientOption::header("bad header", "v"),
            ClientOption::base_url("https://example.com"),
        ]);
        assert!(matches!(client.error(), Some(HttpError::InvalidHeaderName(_))));
        assert_eq!(client.base_url(), &RequestUrl::Unset);
    }

    #[tokio::test]
    async fn test_client_error_is_wrapped_in_requests() {
        let client = Client::new(&[ClientOption::base_url(":invalid-url")]);

        let req = client.get(&[RequestOption::header("x-ignored", "1")]);
        assert!(req.headers().get("x-ignored").is_none());

        let err = req.send().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "client error: Invalid URL ':invalid-url': missing protocol scheme"
        );
        assert!(matches!(err.error(), HttpError::Client(_)));
    }

    #[tokio::test]
    async fn test_base_headers_and_method_shortcuts() {
        let client = Client::new(&[
            ClientOption::base_url("https://example.com/api"),
            ClientOption::header_values("x-base", ["a", "b"]),
            ClientOption::transport(echo_headers()),
        ]);

        for (req, expected) in [
            (client.get(&[]), "GET"),
            (client.post(&[]), "POST"),
            (client.put(&[]), "PUT"),
            (client.patch(&[]), "PATCH"),
            (client.delete(&[]), "DELETE"),
        ] {
            let mut resp = req
                .with(&[RequestOption::header("x-base", "c")])
                .send()
                .await
                .unwrap();
            let text = resp.text().await.unwrap();
            assert!(text.contains("x-base=a\nx-base=b\nx-base=c"), "{text}");
            assert!(
                text.ends_with(&format!("{expected} https://example.com/api")),
                "{text}"
            );
        }
    }

    #[tokio::test]
    async fn test_pre_request_applies_at_send() {
        let client = Client::new(&[
            ClientOption::base_url("https://example.com"),
            ClientOption::transport(echo_headers()),
            ClientOption::pre_request([
                RequestOption::header("x-trace", "pre"),
                RequestOption::path(["v1"]),
            ]),
        ]);

        let req = client.get(&[RequestOption::header("x-trace", "call")]);
        assert!(req.error().is_none());
        assert_eq!(req.headers().get_all("x-trace").iter().count(), 1);
        assert_eq!(req.url().to_string(), "https://example.com/");

        let mut resp = req.send().await.unwrap();
        let text = resp.text().await.unwrap();
        assert!(text.contains("x-trace=call\nx-trace=pre"), "{text}");
        assert!(text.ends_with("GET https://example.com/v1"), "{text}");
    }

    #[tokio::test]
    async fn test_max_body_size_applies_to_responses() {
        let client = Client::new(&[
            ClientOption::base_url("https://example.com"),
            ClientOption::transport(echo_headers()),
            ClientOption::max_body_size(4),
        ]);

        let mut raw: Vec<u8> = Vec::new();
        let err = client
            .get(&[])
            .send_with(vec![ResponseOption::copy_to(&mut raw)])
            .await
            .unwrap_err();
        assert!(matches!(err.error(), HttpError::BodyTooLarge { limit: 4, .. }));
    }

    #[test]
    fn test_transport_override_and_reset() {
        let client = Client::new(&[ClientOption::transport(echo_headers())]);
        assert!(client.inner.transport.is_some());

        let reset = client.with(&[ClientOption::default_transport()]);
        assert!(reset.inner.transport.is_none());
        assert!(client.inner.transport.is_some());
    }

    #[test]
    fn test_middleware_chains_accumulate() {
        let client = Client::new(&[
            ClientOption::post_response([ResponseMiddleware::ExpectJson]),
            ClientOption::post_response([ResponseMiddleware::ErrorForStatus]),
        ]);
        assert_eq!(client.post_response().len(), 2);

        let derived = client.with(&[ClientOption::pre_response([ResponseMiddleware::ExpectJson])]);
        assert_eq!(derived.pre_response().len(), 1);
        assert!(client.pre_response().is_empty());
    }
}
