//! Status code catalogue: class and reason text for numeric statuses.

use http::StatusCode;

/// Class of an HTTP status code, derived from its first digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Redirection,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
}

impl StatusClass {
    /// Classify a raw status code. Codes outside `100..=599` have no class.
    #[must_use]
    pub fn of(code: u16) -> Option<Self> {
        match code {
            100..=199 => Some(Self::Informational),
            200..=299 => Some(Self::Success),
            300..=399 => Some(Self::Redirection),
            400..=499 => Some(Self::ClientError),
            500..=599 => Some(Self::ServerError),
            _ => None,
        }
    }
}

/// Catalogue lookups on [`StatusCode`].
pub trait StatusExt {
    /// The status class, or `None` for non-standard codes.
    fn class(&self) -> Option<StatusClass>;

    /// The registered reason phrase, or `""` when the code is unknown.
    fn text(&self) -> &'static str;
}

impl StatusExt for StatusCode {
    fn class(&self) -> Option<StatusClass> {
        StatusClass::of(self.as_u16())
    }

    fn text(&self) -> &'static str {
        self.canonical_reason().unwrap_or_default()
    }
}
