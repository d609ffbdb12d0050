//! Failure values a handler can report.
//!
//! [`HttpError`] is the *recognized* failure: a status code plus a message
//! meant for the client. Anything else a handler reports is wrapped as
//! [`Failure::Other`] and rendered as a generic `500`, so internal detail
//! never reaches the wire.

use std::fmt;

use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;

use crate::error::Error;

/// A boxed, thread-safe error of any type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An HTTP-level failure: a status code and a client-facing message.
///
/// The message is never empty; when none is given the canonical reason
/// phrase of the status is used instead. Extra response headers (such as
/// `Allow` on a `405`) can be attached with [`with_header`](Self::with_header);
/// renderers apply them after the handler's headers are cleared.
///
/// ```rust
/// use deferr::HttpError;
///
/// let e = HttpError::not_found(None);
/// assert_eq!(e.status().as_u16(), 404);
/// assert_eq!(e.message(), "Not Found");
///
/// let e = HttpError::new(404, Some("X not found")).unwrap();
/// assert_eq!(e.message(), "X not found");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
}

impl HttpError {
    /// Builds a failure from a raw status code.
    ///
    /// Returns [`Error::InvalidStatus`] for codes outside `100..=599`.
    pub fn new(code: u16, message: Option<&str>) -> Result<Self, Error> {
        if !(100..=599).contains(&code) {
            return Err(Error::InvalidStatus(code));
        }
        let status = StatusCode::from_u16(code).map_err(|_| Error::InvalidStatus(code))?;
        Ok(Self::from_status(status, message))
    }

    /// `status` must already be within `100..=599`.
    pub(crate) fn from_status(status: StatusCode, message: Option<&str>) -> Self {
        let message = match message.filter(|m| !m.is_empty()) {
            Some(m) => m.to_owned(),
            None => status.canonical_reason().unwrap_or("Unknown Status").to_owned(),
        };
        Self { status, message, headers: HeaderMap::new() }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }

    /// Headers to send along with the rendered error.
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Adds a header to the error response, replacing any earlier value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Wire shape: `{"status":404,"message":"Not Found"}`.
impl Serialize for HttpError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Payload<'a> {
            status: u16,
            message: &'a str,
        }

        Payload { status: self.status.as_u16(), message: &self.message }.serialize(serializer)
    }
}

// ── Failure ───────────────────────────────────────────────────────────────────

/// Whatever a handler reported.
#[derive(Debug)]
pub enum Failure {
    /// A recognized failure; rendered with its own status and message.
    Http(HttpError),
    /// Any other fault; rendered as a generic `500`.
    Other(BoxError),
}

impl Failure {
    /// Wraps an arbitrary error. A boxed [`HttpError`] is still recognized.
    pub fn other(err: impl Into<BoxError>) -> Self {
        match err.into().downcast::<HttpError>() {
            Ok(e) => Self::Http(*e),
            Err(e) => Self::Other(e),
        }
    }

    /// The recognized failure, if this is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(e) => Some(e),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "{} {}", e.status.as_u16(), e.message),
            Self::Other(e) => write!(f, "{e}"),
        }
    }
}

impl From<HttpError> for Failure {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

// ── IntoFailure ───────────────────────────────────────────────────────────────

/// Conversion into a reportable [`Failure`].
///
/// `None` means "nothing to report". `Option<T>` maps its own `None` there,
/// so an empty optional failure is never mistaken for a real one.
pub trait IntoFailure {
    fn into_failure(self) -> Option<Failure>;
}

impl IntoFailure for Failure {
    fn into_failure(self) -> Option<Failure> { Some(self) }
}

impl IntoFailure for HttpError {
    fn into_failure(self) -> Option<Failure> { Some(Failure::Http(self)) }
}

impl IntoFailure for BoxError {
    fn into_failure(self) -> Option<Failure> { Some(Failure::other(self)) }
}

impl IntoFailure for std::io::Error {
    fn into_failure(self) -> Option<Failure> { Some(Failure::Other(Box::new(self))) }
}

impl IntoFailure for Error {
    fn into_failure(self) -> Option<Failure> { Some(Failure::Other(Box::new(self))) }
}

impl<T: IntoFailure> IntoFailure for Option<T> {
    fn into_failure(self) -> Option<Failure> { self.and_then(IntoFailure::into_failure) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_message_is_reason_phrase() {
        let e = HttpError::new(404, None).unwrap();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
        assert_eq!(e.message(), "Not Found");

        let e = HttpError::new(404, Some("X not found")).unwrap();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
        assert_eq!(e.message(), "X not found");
    }

    #[test]
    fn empty_message_falls_back() {
        let e = HttpError::new(503, Some("")).unwrap();
        assert_eq!(e.message(), "Service Unavailable");
    }

    #[test]
    fn unregistered_code_still_has_a_message() {
        let e = HttpError::new(599, None).unwrap();
        assert_eq!(e.message(), "Unknown Status");
    }

    #[test]
    fn out_of_range_status_is_rejected() {
        assert!(matches!(HttpError::new(99, None), Err(Error::InvalidStatus(99))));
        assert!(matches!(HttpError::new(600, None), Err(Error::InvalidStatus(600))));
    }

    #[test]
    fn serializes_status_and_message() {
        let e = HttpError::new(404, Some("user missing")).unwrap();
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"status":404,"message":"user missing"}"#);
    }

    #[test]
    fn attached_headers_stay_off_the_payload() {
        let e = HttpError::method_not_allowed(None)
            .with_header(http::header::ALLOW, HeaderValue::from_static("GET"));
        assert_eq!(e.headers()[http::header::ALLOW], "GET");
        assert_eq!(
            serde_json::to_string(&e).unwrap(),
            r#"{"status":405,"message":"Method Not Allowed"}"#
        );
    }

    #[test]
    fn boxed_http_error_stays_recognized() {
        let boxed: BoxError = Box::new(HttpError::new(409, None).unwrap());
        let failure = boxed.into_failure().unwrap();
        assert_eq!(failure.as_http().map(HttpError::status), Some(StatusCode::CONFLICT));
    }

    #[test]
    fn other_errors_are_unrecognized() {
        let io = std::io::Error::other("disk on fire");
        let failure = io.into_failure().unwrap();
        assert!(failure.as_http().is_none());
        assert_eq!(failure.to_string(), "disk on fire");
    }

    #[test]
    fn empty_option_is_nothing() {
        let none: Option<HttpError> = None;
        assert!(none.into_failure().is_none());

        let some = Some(HttpError::new(400, None).unwrap());
        assert!(some.into_failure().is_some());
    }
}
