//! Commit-tracking proxy around the real response sink.
//!
//! The [`ErrorReporter`](crate::middleware::ErrorReporter) hands the next
//! stage an [`InterceptingWriter`] instead of the real sink. After the stage
//! returns, the writer answers one question: can the response still be
//! replaced? It can only if nothing was committed and the connection was not
//! hijacked.
//!
//! Every optional capability of the real sink stays reachable through the
//! writer, and every one of them is gated on the same state:
//!
//! | Operation  | Hijacked            | Not committed      | Sink lacks it      |
//! |------------|---------------------|--------------------|--------------------|
//! | `write`    | `Error::Hijacked`   | commits 200 first  | n/a                |
//! | `transfer` | `Error::Hijacked`   | commits 200 first  | copy loop          |
//! | `flush`    | no-op               | commits 200 first  | no-op              |
//! | `push`     | `NotSupported`      | delegates          | `NotSupported`     |
//! | `hijack`   | `Error::Hijacked`   | delegates          | `NotSupported`     |

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Error;
use crate::sink::{BulkTransfer, Flush, Hijack, Hijacked, Push, PushOptions, ResponseSink};

const COPY_BUF: usize = 32 * 1024;

/// A [`ResponseSink`] that forwards to another one while recording whether
/// the response was committed or the connection taken over.
pub struct InterceptingWriter<'s> {
    inner: &'s mut dyn ResponseSink,
    committed: bool,
    hijacked: bool,
    status: Option<StatusCode>,
}

impl<'s> InterceptingWriter<'s> {
    pub fn new(inner: &'s mut dyn ResponseSink) -> Self {
        Self { inner, committed: false, hijacked: false, status: None }
    }

    /// Whether a status line has gone out through this writer.
    pub fn is_committed(&self) -> bool { self.committed }

    /// Whether the connection was taken over for another protocol.
    pub fn is_hijacked(&self) -> bool { self.hijacked }

    /// The first status written, if any.
    pub fn status(&self) -> Option<StatusCode> { self.status }

    /// Read-only access to the wrapped sink.
    pub fn get_ref(&self) -> &dyn ResponseSink { &*self.inner }

    /// Gives the wrapped sink back. Tracking ends with the writer.
    pub fn into_inner(self) -> &'s mut dyn ResponseSink { self.inner }

    fn commit_ok(&mut self) {
        if !self.committed {
            self.set_status(StatusCode::OK);
        }
    }
}

#[async_trait]
impl<'s> ResponseSink for InterceptingWriter<'s> {
    fn headers(&self) -> &HeaderMap { self.inner.headers() }
    fn headers_mut(&mut self) -> &mut HeaderMap { self.inner.headers_mut() }

    fn set_status(&mut self, status: StatusCode) {
        if self.committed || self.hijacked {
            return;
        }
        self.status = Some(status);
        self.committed = true;
        self.inner.set_status(status);
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        if self.hijacked {
            return Err(Error::Hijacked);
        }
        self.commit_ok();
        self.inner.write(buf).await
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> { Some(self) }

    fn pusher(&mut self) -> Option<&mut dyn Push> {
        if self.inner.pusher().is_some() { Some(self) } else { None }
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.inner.hijacker().is_some() { Some(self) } else { None }
    }

    fn bulk(&mut self) -> Option<&mut dyn BulkTransfer> { Some(self) }
}

#[async_trait]
impl<'s> Flush for InterceptingWriter<'s> {
    async fn flush(&mut self) -> Result<(), Error> {
        if self.hijacked {
            return Ok(());
        }
        self.commit_ok();
        match self.inner.flusher() {
            Some(f) => f.flush().await,
            None => Ok(()),
        }
    }
}

impl<'s> Push for InterceptingWriter<'s> {
    fn push(&mut self, target: &str, options: &PushOptions) -> Result<(), Error> {
        if self.hijacked {
            return Err(Error::NotSupported("server push"));
        }
        match self.inner.pusher() {
            Some(p) => p.push(target, options),
            None => Err(Error::NotSupported("server push")),
        }
    }
}

#[async_trait]
impl<'s> Hijack for InterceptingWriter<'s> {
    async fn hijack(&mut self) -> Result<Hijacked, Error> {
        if self.hijacked {
            return Err(Error::Hijacked);
        }
        let Some(h) = self.inner.hijacker() else {
            return Err(Error::NotSupported("hijack"));
        };
        let hijacked = h.hijack().await?;
        self.hijacked = true;
        Ok(hijacked)
    }
}

#[async_trait]
impl<'s> BulkTransfer for InterceptingWriter<'s> {
    async fn transfer(&mut self, src: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64, Error> {
        if self.hijacked {
            return Err(Error::Hijacked);
        }
        self.commit_ok();
        if let Some(native) = self.inner.bulk() {
            return native.transfer(src).await;
        }

        let mut buf = vec![0u8; COPY_BUF];
        let mut total = 0u64;
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            self.inner.write_all(&buf[..n]).await?;
            total += n as u64;
        }
    }
}
