#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Composable HTTP request/response pipeline for `ModKit`
//!
//! This crate layers request building and response processing on top of a
//! pluggable transport:
//! - Reusable, immutable [`Client`] configuration with copy-on-derive
//! - Request construction from small [`RequestOption`] values
//!   (URL, path, query, headers, JSON/form/raw body)
//! - Four middleware chains: pre/post request and pre/post response
//! - Deferred build errors: a failed option never panics, `send` reports it
//!   without touching the network
//! - **Replayable response bodies**: read once from the wire, decoded and
//!   copied as often as needed
//! - Default hyper transport with TLS (rustls), pooling, per-attempt timeout
//!   and transparent decompression
//!
//! # Example
//!
//! ```ignore
//! use modkit_http_pipeline::{
//!     Client, ClientOption, RequestOption, ResponseMiddleware, ResponseOption,
//! };
//!
//! let client = Client::new(&[
//!     ClientOption::base_url("https://example.com/api"),
//!     ClientOption::post_response([ResponseMiddleware::ErrorForStatus]),
//! ]);
//!
//! let mut out = Reply::default();
//! let resp = client
//!     .post(&[
//!         RequestOption::path(["foo", "bar"]),
//!         RequestOption::header("foo", "bar"),
//!         RequestOption::json(&Payload { foo: "foo", bar: 123 }),
//!     ])
//!     .send_with(vec![ResponseOption::json(&mut out)])
//!     .await?;
//!
//! // The body is still available after decoding.
//! let raw = resp.into_body().captured().to_vec();
//! ```

mod client;
mod config;
mod error;
mod options;
mod replay;
mod request;
mod response;
mod status;
mod target;
mod transport;

pub use client::Client;
pub use config::{DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, TransportConfig, TransportSecurity};
pub use error::{BoxError, ErrorGroup, HttpError, InvalidUriKind, SendError};
pub use options::{
    ClientOption, EncodedBody, InspectFn, RequestFn, RequestOption, ResponseMiddleware,
    ResponseOption,
};
pub use replay::ReplayBody;
pub use request::Request;
pub use response::{HttpResponse, ResponseBody, full_body, parse_retry_after};
pub use status::{StatusClass, StatusExt};
pub use target::RequestUrl;
pub use transport::Transport;
