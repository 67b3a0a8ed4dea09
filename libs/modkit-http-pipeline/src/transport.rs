//! Round-trip transport used by clients.
//!
//! A [`Transport`] is a cloneable, type-erased tower service. Clients that do
//! not configure one share a process-wide hyper transport built from
//! [`TransportConfig::default`] on first use.

use crate::config::{TransportConfig, TransportSecurity};
use crate::error::{HttpError, InvalidUriKind};
use crate::response::ResponseBody;
use bytes::Bytes;
use http::header::USER_AGENT;
use http::{HeaderValue, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

type TransportService = BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

static DEFAULT_TRANSPORT: OnceLock<Result<Transport, String>> = OnceLock::new();

/// Cloneable handle to an HTTP round-tripper.
#[derive(Clone)]
pub struct Transport {
    service: TransportService,
}

impl Transport {
    /// Wrap any tower service with the transport's request/response types.
    #[must_use]
    pub fn new<S>(service: S) -> Self
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            service: BoxCloneSyncService::new(service),
        }
    }

    /// Build a transport from an async function; handy for mocks.
    #[must_use]
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request<Full<Bytes>>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<ResponseBody>, HttpError>> + Send + 'static,
    {
        Self::new(tower::service_fn(f))
    }

    /// Build the hyper-based transport.
    ///
    /// The stack is (outer to inner): scheme check and User-Agent injection,
    /// error mapping, per-attempt timeout, decompression, pooled hyper client.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Tls` if the TLS connector cannot be initialized and
    /// `HttpError::InvalidHeaderValue` if the configured user agent is invalid.
    pub fn hyper(config: &TransportConfig) -> Result<Self, HttpError> {
        if config.transport_security == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let timeout = config.request_timeout;
        let user_agent = HeaderValue::from_str(&config.user_agent)?;
        let https = build_https_connector(config.transport_security)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));
        let inner: TransportService = BoxCloneSyncService::new(service);

        let security = config.transport_security;
        Ok(Self::from_fn(move |mut req: Request<Full<Bytes>>| {
            let inner = inner.clone();
            let user_agent = user_agent.clone();
            async move {
                check_scheme(req.uri(), security)?;
                if !req.headers().contains_key(USER_AGENT) {
                    req.headers_mut().insert(USER_AGENT, user_agent);
                }
                inner.oneshot(req).await
            }
        }))
    }

    /// The process-wide default transport.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Tls` if the default transport failed to initialize.
    pub fn shared() -> Result<Self, HttpError> {
        let built = DEFAULT_TRANSPORT.get_or_init(|| {
            Self::hyper(&TransportConfig::default()).map_err(|e| e.to_string())
        });
        match built {
            Ok(transport) => Ok(transport.clone()),
            Err(msg) => Err(HttpError::Tls(msg.clone().into())),
        }
    }

    /// Perform one round trip.
    ///
    /// # Errors
    ///
    /// Returns whatever error the underlying service reports.
    pub async fn round_trip(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        self.service.clone().oneshot(request).await
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

fn check_scheme(uri: &Uri, security: TransportSecurity) -> Result<(), HttpError> {
    match uri.scheme_str() {
        Some("https") => Ok(()),
        Some("http") => match security {
            TransportSecurity::AllowInsecureHttp => Ok(()),
            TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
        },
        Some(scheme) => Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        }),
        None => Err(HttpError::InvalidUri {
            url: uri.to_string(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        }),
    }
}

/// Map tower errors to `HttpError` with the actual timeout duration.
///
/// A boxed `HttpError` is unwrapped before falling back to `Transport`.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Crypto provider for TLS connections.
///
/// Uses the globally installed provider when there is one, otherwise a fresh
/// aws-lc-rs provider without installing it globally.
fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// HTTPS connector with webpki roots; ALPN advertises both h2 and http/1.1.
fn build_https_connector(
    security: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let builder = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(get_crypto_provider())
        .map_err(|e| HttpError::Tls(Box::new(e)))?;
    let connector = match security {
        TransportSecurity::AllowInsecureHttp => {
            builder.https_or_http().enable_all_versions().build()
        }
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
    };
    Ok(connector)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::response::full_body;
    use http::StatusCode;

    fn echo_method() -> Transport {
        Transport::from_fn(|req: Request<Full<Bytes>>| async move {
            let response = Response::builder()
                .status(StatusCode::OK)
                .body(full_body(req.method().as_str().to_owned()))?;
            Ok::<_, HttpError>(response)
        })
    }

    #[tokio::test]
    async fn test_from_fn_round_trip() {
        let transport = echo_method();
        let request = Request::put("https://example.com/")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = transport.clone().round_trip(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "PUT");
    }

    #[test]
    fn test_check_scheme() {
        let https: Uri = "https://example.com".parse().unwrap();
        let http: Uri = "http://example.com".parse().unwrap();
        let ftp: Uri = "ftp://example.com".parse().unwrap();
        let relative: Uri = "/just/a/path".parse().unwrap();

        assert!(check_scheme(&https, TransportSecurity::TlsOnly).is_ok());
        assert!(check_scheme(&http, TransportSecurity::AllowInsecureHttp).is_ok());
        assert!(matches!(
            check_scheme(&http, TransportSecurity::TlsOnly),
            Err(HttpError::InvalidScheme { ref scheme, .. }) if scheme == "http"
        ));
        assert!(matches!(
            check_scheme(&ftp, TransportSecurity::AllowInsecureHttp),
            Err(HttpError::InvalidScheme { ref scheme, .. }) if scheme == "ftp"
        ));
        assert!(matches!(
            check_scheme(&relative, TransportSecurity::AllowInsecureHttp),
            Err(HttpError::InvalidUri {
                kind: InvalidUriKind::MissingScheme,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_hyper_transport_rejects_plain_http_when_tls_only() {
        let transport = Transport::hyper(&TransportConfig::default()).unwrap();
        let request = Request::get("http://127.0.0.1:1/")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let err = transport.round_trip(request).await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { .. }));
    }

    #[test]
    fn test_hyper_transport_rejects_invalid_user_agent() {
        let config = TransportConfig {
            user_agent: "bad\nagent".to_owned(),
            ..TransportConfig::for_testing()
        };
        assert!(matches!(
            Transport::hyper(&config),
            Err(HttpError::InvalidHeaderValue(_))
        ));
    }

    #[test]
    fn test_shared_transport_is_cached() {
        let first = Transport::shared();
        let second = Transport::shared();
        assert_eq!(first.is_ok(), second.is_ok());
    }

    #[test]
    fn test_map_tower_error() {
        let timeout = Duration::from_secs(3);

        let elapsed: tower::BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(
            map_tower_error(elapsed, timeout),
            HttpError::Timeout(d) if d == timeout
        ));

        let typed: tower::BoxError = Box::new(HttpError::MissingBaseUrl);
        assert!(matches!(
            map_tower_error(typed, timeout),
            HttpError::MissingBaseUrl
        ));

        let other: tower::BoxError = "connection reset by peer".into();
        let mapped = map_tower_error(other, timeout);
        assert_eq!(mapped.to_string(), "connection reset by peer");
    }
}
