//! Composable options for clients, requests and responses.
//!
//! Every option is a value with a single `apply` step. Chains of options are
//! applied left to right and stop at the first failure.

mod client;
mod request;
mod response;

pub use client::ClientOption;
pub use request::{EncodedBody, RequestFn, RequestOption};
pub use response::{InspectFn, ResponseMiddleware, ResponseOption};

use crate::error::HttpError;
use http::{HeaderMap, HeaderName, HeaderValue};

/// Validate a header and append all of its values, keeping existing ones.
///
/// Nothing is appended unless the name and every value are valid.
pub fn append_header(
    headers: &mut HeaderMap,
    name: &str,
    values: &[String],
) -> Result<(), HttpError> {
    let name = HeaderName::from_bytes(name.as_bytes())?;
    let values = values
        .iter()
        .map(|v| HeaderValue::from_str(v))
        .collect::<Result<Vec<_>, _>>()?;
    for value in values {
        headers.append(name.clone(), value);
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_append_header_keeps_order_and_duplicates() {
        let mut headers = HeaderMap::new();
        append_header(&mut headers, "X-Trace", &["a".to_owned()]).unwrap();
        append_header(&mut headers, "x-trace", &["b".to_owned(), "a".to_owned()]).unwrap();

        let values: Vec<_> = headers.get_all("x-trace").iter().collect();
        assert_eq!(values, ["a", "b", "a"]);
    }

    #[test]
    fn test_append_header_is_all_or_nothing() {
        let mut headers = HeaderMap::new();
        let err = append_header(
            &mut headers,
            "x-good",
            &["fine".to_owned(), "bad\r\nvalue".to_owned()],
        )
        .unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaderValue(_)));
        assert!(headers.is_empty());

        let err = append_header(&mut headers, "bad header", &[]).unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaderName(_)));
    }
}
