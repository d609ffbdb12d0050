//! In-memory [`ResponseSink`].
//!
//! Used two ways: as the buffer behind
//! [`ErrorReporter::buffered`](crate::middleware::ErrorReporter::buffered),
//! and in tests to inspect what a handler wrote without a socket.
//!
//! ```rust
//! use deferr::{Recorder, ResponseSink};
//! use http::StatusCode;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut rec = Recorder::new();
//! rec.set_status(StatusCode::CREATED);
//! rec.write_all(b"done").await.unwrap();
//!
//! assert_eq!(rec.status(), Some(StatusCode::CREATED));
//! assert_eq!(rec.body(), b"done");
//! # }
//! ```

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};

use crate::error::Error;
use crate::sink::{Flush, ResponseSink};

/// A sink that keeps everything in memory.
///
/// Like a real transport, it snapshots the header map when the status is
/// set; later header changes do not alter what was "sent".
#[derive(Debug, Default)]
pub struct Recorder {
    headers: HeaderMap,
    sent_headers: Option<HeaderMap>,
    status: Option<StatusCode>,
    body: Vec<u8>,
    flushed: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose header map starts as a copy of `headers`.
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self { headers, ..Self::default() }
    }

    /// The committed status, or `None` if nothing was sent.
    pub fn status(&self) -> Option<StatusCode> { self.status }

    /// Headers as they were when the status was sent, or the live map if
    /// the response is not committed yet.
    pub fn sent_headers(&self) -> &HeaderMap {
        self.sent_headers.as_ref().unwrap_or(&self.headers)
    }

    pub fn body(&self) -> &[u8] { &self.body }

    pub fn is_flushed(&self) -> bool { self.flushed }

    /// Writes the recorded response into `sink`.
    ///
    /// The sink's headers are replaced by the recorded ones. Nothing is
    /// committed on `sink` if nothing was committed here.
    pub async fn replay(self, sink: &mut dyn ResponseSink) -> Result<(), Error> {
        let Self { headers, sent_headers, status, body, .. } = self;
        *sink.headers_mut() = sent_headers.unwrap_or(headers);
        if let Some(status) = status {
            sink.set_status(status);
        }
        if !body.is_empty() {
            sink.write_all(&body).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseSink for Recorder {
    fn headers(&self) -> &HeaderMap { &self.headers }
    fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    fn set_status(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);
        self.sent_headers = Some(self.headers.clone());
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.set_status(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> { Some(self) }
}

#[async_trait]
impl Flush for Recorder {
    async fn flush(&mut self) -> Result<(), Error> {
        self.set_status(StatusCode::OK);
        self.flushed = true;
        Ok(())
    }
}
