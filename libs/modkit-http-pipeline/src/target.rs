//! Request URL handling: absolute-or-relative targets with path join and
//! deterministic query merging.

use crate::error::{HttpError, InvalidUriKind};
use std::collections::BTreeMap;
use std::fmt;
use url::{Url, form_urlencoded};

/// URL of a request or base URL of a client.
///
/// A relative reference is kept as written; it only becomes usable for a
/// round trip once resolved against an absolute base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestUrl {
    /// No URL configured
    #[default]
    Unset,
    /// Absolute URL with a scheme
    Absolute(Url),
    /// Relative reference such as `v1/items?page=2`
    Relative(String),
}

impl RequestUrl {
    /// Parse an absolute URL or a relative reference.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidUri` when the input is neither a valid
    /// absolute URL nor a valid relative reference (e.g. `:no-scheme`).
    pub fn parse(input: &str) -> Result<Self, HttpError> {
        match Url::parse(input) {
            Ok(url) => Ok(Self::Absolute(url)),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                // A relative-path reference cannot have a colon in its first segment.
                let first_segment = input.split(['/', '?', '#']).next().unwrap_or_default();
                if first_segment.contains(':') {
                    return Err(HttpError::InvalidUri {
                        url: input.to_owned(),
                        kind: InvalidUriKind::MissingScheme,
                        reason: "missing protocol scheme".to_owned(),
                    });
                }
                Ok(Self::Relative(input.to_owned()))
            }
            Err(e) => Err(HttpError::InvalidUri {
                url: input.to_owned(),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            }),
        }
    }

    /// Parse `input` and resolve it against `self` when `self` is absolute.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidUri` if `input` cannot be parsed or resolved.
    pub fn resolve(&self, input: &str) -> Result<Self, HttpError> {
        match (Self::parse(input)?, self) {
            (Self::Relative(reference), Self::Absolute(base)) => base
                .join(&reference)
                .map(Self::Absolute)
                .map_err(|e| HttpError::InvalidUri {
                    url: input.to_owned(),
                    kind: InvalidUriKind::ParseError,
                    reason: e.to_string(),
                }),
            (parsed, _) => Ok(parsed),
        }
    }

    /// The absolute URL, if any.
    #[must_use]
    pub fn as_absolute(&self) -> Option<&Url> {
        match self {
            Self::Absolute(url) => Some(url),
            Self::Unset | Self::Relative(_) => None,
        }
    }

    /// Append path segments using cleaned path-join semantics.
    ///
    /// Empty and `.` segments are dropped, `..` removes the previous segment,
    /// and a trailing slash is not preserved.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::MissingBaseUrl` unless the URL is absolute and has a host.
    pub fn append_path<S: AsRef<str>>(&mut self, segments: &[S]) -> Result<(), HttpError> {
        let url = match self {
            Self::Absolute(url) if url.host().is_some() => url,
            _ => return Err(HttpError::MissingBaseUrl),
        };
        let joined = join_path(url.path(), segments.iter().map(AsRef::as_ref));
        url.set_path(&joined);
        Ok(())
    }

    /// Add query parameters, keeping the existing ones.
    ///
    /// The whole query is re-encoded with keys sorted and each key's values
    /// in insertion order, so the result does not depend on how the existing
    /// query was spelled.
    pub fn append_query<K, V>(&mut self, pairs: &[(K, V)])
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        match self {
            Self::Absolute(url) => {
                let merged = merge_query(url.query(), pairs);
                url.set_query(merged.as_deref());
            }
            Self::Relative(reference) => {
                let (without_fragment, fragment) = match reference.split_once('#') {
                    Some((head, frag)) => (head, Some(frag)),
                    None => (reference.as_str(), None),
                };
                let (path, query) = match without_fragment.split_once('?') {
                    Some((path, query)) => (path, Some(query)),
                    None => (without_fragment, None),
                };
                let mut rebuilt = path.to_owned();
                if let Some(query) = merge_query(query, pairs) {
                    rebuilt.push('?');
                    rebuilt.push_str(&query);
                }
                if let Some(fragment) = fragment {
                    rebuilt.push('#');
                    rebuilt.push_str(fragment);
                }
                *reference = rebuilt;
            }
            Self::Unset => {
                if let Some(query) = merge_query(None, pairs) {
                    *self = Self::Relative(format!("?{query}"));
                }
            }
        }
    }

    /// Convert into an `http::Uri` for the transport.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidUri` when the URL is unset, relative, or
    /// rejected by `http::Uri`.
    pub fn to_uri(&self) -> Result<http::Uri, HttpError> {
        match self {
            Self::Absolute(url) => {
                if url.host().is_none() {
                    return Err(HttpError::InvalidUri {
                        url: url.to_string(),
                        kind: InvalidUriKind::MissingAuthority,
                        reason: "missing host/authority".to_owned(),
                    });
                }
                url.as_str()
                    .parse()
                    .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                        url: url.to_string(),
                        kind: InvalidUriKind::ParseError,
                        reason: e.to_string(),
                    })
            }
            Self::Relative(reference) => Err(HttpError::InvalidUri {
                url: reference.clone(),
                kind: InvalidUriKind::MissingScheme,
                reason: "relative URL without a base URL".to_owned(),
            }),
            Self::Unset => Err(HttpError::InvalidUri {
                url: String::new(),
                kind: InvalidUriKind::MissingScheme,
                reason: "no URL configured".to_owned(),
            }),
        }
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => Ok(()),
            Self::Absolute(url) => f.write_str(url.as_str()),
            Self::Relative(reference) => f.write_str(reference),
        }
    }
}

impl From<Url> for RequestUrl {
    fn from(url: Url) -> Self {
        Self::Absolute(url)
    }
}

fn join_path<'a>(base: &'a str, segments: impl Iterator<Item = &'a str>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for piece in std::iter::once(base).chain(segments) {
        for segment in piece.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                s => parts.push(s),
            }
        }
    }
    format!("/{}", parts.join("/"))
}

fn merge_query<K, V>(existing: Option<&str>, pairs: &[(K, V)]) -> Option<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(existing.unwrap_or_default().as_bytes()) {
        merged
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    for (key, value) in pairs {
        merged
            .entry(key.as_ref().to_owned())
            .or_default()
            .push(value.as_ref().to_owned());
    }
    if merged.is_empty() {
        return None;
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, values) in &merged {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    Some(serializer.finish())
}
