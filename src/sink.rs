//! The response sink: what a handler writes its response into.
//!
//! [`ResponseSink`] is the mandatory part: a header map, a status line, and
//! body bytes. Everything else a transport *may* offer is an optional
//! capability, discovered at runtime through an accessor that returns
//! `None` when the sink cannot do it:
//!
//! | Accessor      | Capability       | Typical provider            |
//! |---------------|------------------|-----------------------------|
//! | `flusher()`   | [`Flush`]        | streaming bodies            |
//! | `pusher()`    | [`Push`]         | HTTP/2 server push          |
//! | `hijacker()`  | [`Hijack`]       | HTTP/1 upgrade (WebSocket)  |
//! | `bulk()`      | [`BulkTransfer`] | zero-copy / chunked sources |
//!
//! Wrappers such as [`InterceptingWriter`](crate::InterceptingWriter) must
//! answer these accessors truthfully so that code further down the chain can
//! still discover what the real transport supports.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;

/// An HTTP response under construction.
///
/// Headers may be changed until the status is sent. The first call to
/// [`set_status`](ResponseSink::set_status) or [`write`](ResponseSink::write)
/// commits the response; a `write` before any status commits `200 OK`.
#[async_trait]
pub trait ResponseSink: Send {
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and the current headers. Later calls are ignored.
    fn set_status(&mut self, status: StatusCode);

    /// Writes body bytes, returning how many were accepted.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Error>;

    async fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> { None }
    fn pusher(&mut self) -> Option<&mut dyn Push> { None }
    fn hijacker(&mut self) -> Option<&mut dyn Hijack> { None }
    fn bulk(&mut self) -> Option<&mut dyn BulkTransfer> { None }
}

/// Sends buffered body bytes to the client now.
#[async_trait]
pub trait Flush: Send {
    async fn flush(&mut self) -> Result<(), Error>;
}

/// HTTP/2 server push.
pub trait Push: Send {
    fn push(&mut self, target: &str, options: &PushOptions) -> Result<(), Error>;
}

/// Takes the connection over for a different protocol.
///
/// After a successful hijack the caller owns the connection; the sink must
/// not be used as an HTTP response any more.
#[async_trait]
pub trait Hijack: Send {
    async fn hijack(&mut self) -> Result<Hijacked, Error>;
}

/// Streams a whole reader into the body using the sink's native path.
#[async_trait]
pub trait BulkTransfer: Send {
    async fn transfer(&mut self, src: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64, Error>;
}

// ── Capability payloads ───────────────────────────────────────────────────────

/// Request line and headers for a pushed resource.
#[derive(Clone, Debug)]
pub struct PushOptions {
    pub method: Method,
    pub headers: HeaderMap,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self { method: Method::GET, headers: HeaderMap::new() }
    }
}

/// A raw bidirectional byte stream.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// The result of a successful [`Hijack`].
pub struct Hijacked {
    /// The connection, now exclusively owned by the caller.
    pub conn: Box<dyn Connection>,
    /// Bytes the server had already read past the request head.
    pub read_buf: Bytes,
}

impl std::fmt::Debug for Hijacked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hijacked").field("read_buf", &self.read_buf.len()).finish_non_exhaustive()
    }
}
