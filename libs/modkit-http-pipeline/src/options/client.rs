use super::{RequestOption, ResponseMiddleware};
use crate::client::ClientState;
use crate::error::HttpError;
use crate::target::RequestUrl;
use crate::transport::Transport;
use url::Url;

/// One step of configuring a client.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ClientOption {
    /// Parse and set the base URL (absolute or relative)
    BaseUrl(String),
    /// Set an already parsed base URL
    BaseUri(Url),
    /// Append values for a header sent with every request
    Header { name: String, values: Vec<String> },
    /// Use this transport; `None` falls back to the shared default
    Transport(Option<Transport>),
    /// Cap on captured response body bytes
    MaxBodySize(usize),
    /// Applied to every new request before the caller's options
    PreRequest(Vec<RequestOption>),
    /// Applied to every request right before it is sent
    PostRequest(Vec<RequestOption>),
    /// Applied to every response before the per-call options
    PreResponse(Vec<ResponseMiddleware>),
    /// Applied to every response after the per-call options
    PostResponse(Vec<ResponseMiddleware>),
}

impl ClientOption {
    #[must_use]
    pub fn base_url(url: impl Into<String>) -> Self {
        Self::BaseUrl(url.into())
    }

    #[must_use]
    pub fn base_uri(url: Url) -> Self {
        Self::BaseUri(url)
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
    pub fn transport(transport: Transport) -> Self {
        Self::Transport(Some(transport))
    }

    /// Go back to the shared default transport.
    #[must_use]
    pub fn default_transport() -> Self {
        Self::Transport(None)
    }

    #[must_use]
    pub fn max_body_size(limit: usize) -> Self {
        Self::MaxBodySize(limit)
    }

    #[must_use]
    pub fn pre_request(options: impl IntoIterator<Item = RequestOption>) -> Self {
        Self::PreRequest(options.into_iter().collect())
    }

    #[must_use]
    pub fn post_request(options: impl IntoIterator<Item = RequestOption>) -> Self {
        Self::PostRequest(options.into_iter().collect())
    }

    #[must_use]
    pub fn pre_response(middleware: impl IntoIterator<Item = ResponseMiddleware>) -> Self {
        Self::PreResponse(middleware.into_iter().collect())
    }

    #[must_use]
    pub fn post_response(middleware: impl IntoIterator<Item = ResponseMiddleware>) -> Self {
        Self::PostResponse(middleware.into_iter().collect())
    }

    pub(crate) fn apply(&self, state: &mut ClientState) -> Result<(), HttpError> {
        match self {
            Self::BaseUrl(raw) => state.base_url = RequestUrl::parse(raw)?,
            Self::BaseUri(url) => state.base_url = RequestUrl::Absolute(url.clone()),
            Self::Header { name, values } => {
                super::append_header(&mut state.base_headers, name, values)?;
            }
            Self::Transport(transport) => state.transport.clone_from(transport),
            Self::MaxBodySize(limit) => state.max_body_size = *limit,
            Self::PreRequest(options) => state.pre_request.extend(options.iter().cloned()),
            Self::PostRequest(options) => state.post_request.extend(options.iter().cloned()),
            Self::PreResponse(middleware) => {
                state.pre_response.extend(middleware.iter().cloned());
            }
            Self::PostResponse(middleware) => {
                state.post_response.extend(middleware.iter().cloned());
            }
        }
        Ok(())
    }
}
