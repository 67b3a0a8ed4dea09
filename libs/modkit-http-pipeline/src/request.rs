use crate::client::Client;
use crate::error::{ErrorGroup, HttpError, SendError};
use crate::options::{RequestOption, ResponseOption};
use crate::response::HttpResponse;
use crate::target::RequestUrl;
use bytes::Bytes;
use http::{HeaderMap, Method};
use http_body_util::Full;
use std::fmt;
use tracing::Instrument;

/// Build progress of a request.
///
/// Once `Failed`, every later option is skipped and `send` returns the error.
enum BuildState {
    Building,
    Failed(HttpError),
}

/// One HTTP call under construction.
///
/// Created by [`Client::new_request`] and the method shortcuts. Options that
/// fail do not abort construction; the first failure is kept and returned by
/// [`send`](Request::send) without touching the network.
///
/// # Example
///
/// ```ignore
/// use modkit_http_pipeline::{Client, ClientOption, RequestOption, ResponseOption};
///
/// let client = Client::new(&[ClientOption::base_url("https://api.example.com")]);
///
/// let mut user = User::default();
/// let resp = client
///     .post(&[
///         RequestOption::path(["users"]),
///         RequestOption::json(&NewUser { name: "Alice" }),
///     ])
///     .send_with(vec![ResponseOption::json(&mut user)])
///     .await?;
/// ```
#[must_use = "Request does nothing until .send() is called"]
pub struct Request {
    client: Client,
    method: Method,
    url: RequestUrl,
    headers: HeaderMap,
    body: Option<Bytes>,
    state: BuildState,
}

impl Request {
    /// Seed a request from the client's base URL and headers.
    pub(crate) fn new(client: Client, method: Method) -> Self {
        Self {
            url: client.base_url().clone(),
            headers: client.base_headers().clone(),
            body: None,
            state: BuildState::Building,
            method,
            client,
        }
    }

    /// A request that fails before any option runs.
    pub(crate) fn failed(client: Client, method: Method, error: HttpError) -> Self {
        let mut request = Self::new(client, method);
        request.state = BuildState::Failed(error);
        request
    }

    /// Apply options in order; the first failure is kept and the rest are skipped.
    pub fn with(mut self, options: &[RequestOption]) -> Self {
        self.apply_all(options);
        self
    }

    pub(crate) fn apply_all(&mut self, options: &[RequestOption]) {
        for option in options {
            if matches!(self.state, BuildState::Failed(_)) {
                return;
            }
            if let Err(e) = option.apply(self) {
                self.state = BuildState::Failed(HttpError::request(e));
            }
        }
    }

    /// Apply every option and fail with all collected errors, if any.
    pub(crate) fn apply_collecting(&mut self, options: &[RequestOption]) {
        if matches!(self.state, BuildState::Failed(_)) {
            return;
        }
        let errors = options
            .iter()
            .filter_map(|option| option.apply(self).err())
            .collect();
        if let Some(group) = ErrorGroup::from_errors(errors) {
            self.state = BuildState::Failed(HttpError::request(HttpError::Group(group)));
        }
    }

    /// The client this request was derived from.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &RequestUrl {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut RequestUrl {
        &mut self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = Some(body.into());
    }

    /// The pending build error, if any option failed.
    #[must_use]
    pub fn error(&self) -> Option<&HttpError> {
        match &self.state {
            BuildState::Building => None,
            BuildState::Failed(e) => Some(e),
        }
    }

    /// Send the request without per-call response options.
    ///
    /// # Errors
    ///
    /// See [`send_with`](Self::send_with).
    pub async fn send(self) -> Result<HttpResponse, SendError> {
        self.send_with(Vec::new()).await
    }

    /// Send the request and run the response pipeline.
    ///
    /// Order: pre-request middleware, post-request middleware, transport
    /// round trip, pre-response middleware, `options`, post-response
    /// middleware.
    ///
    /// Dropping the returned future cancels the round trip.
    ///
    /// # Errors
    ///
    /// - the pending build error, without calling the transport
    /// - the first request middleware failure, unwrapped
    /// - the transport error, verbatim
    /// - the first response stage failure, together with the response
    pub async fn send_with(
        mut self,
        options: Vec<ResponseOption<'_>>,
    ) -> Result<HttpResponse, SendError> {
        if let BuildState::Failed(err) = std::mem::replace(&mut self.state, BuildState::Building) {
            tracing::debug!(error = %err, "request not sent: build failed");
            return Err(SendError::new(err));
        }

        let client = self.client.clone();
        for option in client.pre_request().iter().chain(client.post_request()) {
            option.apply(&mut self)?;
        }

        let uri = self.url.to_uri()?;
        let span = tracing::debug_span!(
            "outgoing_http",
            http.method = %self.method,
            http.url = %sanitized_url(&uri),
            http.status_code = tracing::field::Empty,
        );
        let mut request = http::Request::builder()
            .method(self.method)
            .uri(uri)
            .body(Full::new(self.body.unwrap_or_default()))
            .map_err(HttpError::from)?;
        *request.headers_mut() = self.headers;

        let transport = client.transport()?;
        let response = transport
            .round_trip(request)
            .instrument(span.clone())
            .await?;
        span.record("http.status_code", response.status().as_u16());

        let mut response = HttpResponse::new(response, client.max_body_size());
        match run_response_stages(&client, &mut response, options)
            .instrument(span)
            .await
        {
            Ok(()) => Ok(response),
            Err(e) => {
                tracing::debug!(error = %e, status = %response.status(), "response processing failed");
                Err(SendError::with_response(e, response))
            }
        }
    }
}

async fn run_response_stages(
    client: &Client,
    response: &mut HttpResponse,
    options: Vec<ResponseOption<'_>>,
) -> Result<(), HttpError> {
    for middleware in client.pre_response() {
        middleware.apply(response).await?;
    }
    response.apply(options).await?;
    for middleware in client.post_response() {
        middleware.apply(response).await?;
    }
    Ok(())
}

/// Scheme, authority and path only; query strings may carry secrets.
fn sanitized_url(uri: &http::Uri) -> String {
    format!(
        "{}://{}{}",
        uri.scheme_str().unwrap_or("https"),
        uri.authority().map_or("", http::uri::Authority::as_str),
        uri.path()
    )
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.to_string())
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("error", &self.error())
            .finish_non_exhaustive()
    }
}
