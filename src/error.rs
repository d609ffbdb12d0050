//! Unified error type.

use std::fmt;

/// The error type returned by deferr's fallible operations.
///
/// Application-level failures (404, 422, etc.) are not `Error`s: they are
/// [`HttpError`](crate::HttpError) values handed to [`report`](crate::report).
/// This type surfaces what goes wrong while *writing* a response: transport
/// faults, misuse of a hijacked connection, and missing sink capabilities.
#[derive(Debug)]
pub enum Error {
    /// The underlying transport failed, e.g. the client disconnected.
    Io(std::io::Error),
    /// The connection was taken over for another protocol.
    Hijacked,
    /// The sink does not offer the named capability.
    NotSupported(&'static str),
    /// The operation needs an uncommitted response, but headers are sent.
    Committed,
    /// A status code outside `100..=599`.
    InvalidStatus(u16),
    /// A failure payload could not be serialized.
    Json(serde_json::Error),
    /// [`set_default_renderer`](crate::render::set_default_renderer) was
    /// called more than once.
    RendererAlreadySet,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)              => write!(f, "io: {e}"),
            Self::Hijacked           => f.write_str("write after hijack"),
            Self::NotSupported(what) => write!(f, "{what} not supported"),
            Self::Committed          => f.write_str("response already committed"),
            Self::InvalidStatus(c)   => write!(f, "invalid status code {c}"),
            Self::Json(e)            => write!(f, "json: {e}"),
            Self::RendererAlreadySet => f.write_str("default renderer already set"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e)   => Some(e),
            Self::Json(e) => Some(e),
            _             => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
