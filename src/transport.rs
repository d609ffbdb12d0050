//! The hyper-backed [`ResponseSink`].
//!
//! hyper wants a whole `Response` back from its service future, while a
//! handler writes its response incrementally. The two meet over a pair of
//! channels: the head travels through a oneshot the moment the status is
//! committed, and body chunks follow on a bounded mpsc that backs the
//! response's [`Body`].

use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use hyper::body::{Body, Frame};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::Error;
use crate::sink::{BulkTransfer, Flush, Hijack, Hijacked, ResponseSink};

/// Body bytes are coalesced up to this size before they are handed to hyper.
const COALESCE: usize = 8 * 1024;
/// Read size for [`BulkTransfer`].
const CHUNK: usize = 32 * 1024;
/// In-flight body chunks before `write` waits on the client.
const DEPTH: usize = 16;

pub(crate) type Head = Response<ChannelBody>;

pub(crate) struct HyperSink {
    headers: HeaderMap,
    head: Option<oneshot::Sender<Head>>,
    body: Option<mpsc::Sender<Bytes>>,
    pending: BytesMut,
    upgrade: Option<OnUpgrade>,
    hijacked: bool,
}

impl HyperSink {
    /// `upgrade` is present only for requests that asked to switch protocols.
    pub(crate) fn new(head: oneshot::Sender<Head>, upgrade: Option<OnUpgrade>) -> Self {
        Self {
            headers: HeaderMap::new(),
            head: Some(head),
            body: None,
            pending: BytesMut::new(),
            upgrade,
            hijacked: false,
        }
    }

    /// Completes the response once the handler has returned.
    ///
    /// An untouched response becomes an empty `200 OK`. Dropping the body
    /// sender afterwards ends the stream.
    pub(crate) async fn finish(mut self) {
        if self.hijacked {
            return;
        }
        if self.head.is_some() {
            self.set_status(StatusCode::OK);
        }
        if let Err(e) = self.send_pending().await {
            debug!("response body not delivered: {e}");
        }
    }

    fn commit(&mut self) {
        if self.head.is_some() {
            self.set_status(StatusCode::OK);
        }
    }

    async fn send(&mut self, chunk: Bytes) -> Result<(), Error> {
        let Some(body) = &self.body else {
            return Err(Error::Hijacked);
        };
        body.send(chunk).await.map_err(|_| disconnected())
    }

    async fn send_pending(&mut self) -> Result<(), Error> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = self.pending.split().freeze();
        self.send(chunk).await
    }
}

fn disconnected() -> Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected").into()
}

#[async_trait]
impl ResponseSink for HyperSink {
    fn headers(&self) -> &HeaderMap { &self.headers }
    fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    fn set_status(&mut self, status: StatusCode) {
        let Some(head) = self.head.take() else { return };

        let (tx, rx) = mpsc::channel(DEPTH);
        let mut response = Response::new(ChannelBody { rx: Some(rx) });
        *response.status_mut() = status;
        *response.headers_mut() = self.headers.clone();

        if head.send(response).is_err() {
            debug!(%status, "connection closed before the response head was sent");
        }
        self.body = Some(tx);
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        if self.hijacked {
            return Err(Error::Hijacked);
        }
        self.commit();
        self.pending.extend_from_slice(buf);
        if self.pending.len() >= COALESCE {
            self.send_pending().await?;
        }
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> { Some(self) }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.upgrade.is_some() { Some(self) } else { None }
    }

    fn bulk(&mut self) -> Option<&mut dyn BulkTransfer> { Some(self) }
}

#[async_trait]
impl Flush for HyperSink {
    async fn flush(&mut self) -> Result<(), Error> {
        if self.hijacked {
            return Ok(());
        }
        self.commit();
        self.send_pending().await
    }
}

#[async_trait]
impl BulkTransfer for HyperSink {
    async fn transfer(&mut self, src: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64, Error> {
        if self.hijacked {
            return Err(Error::Hijacked);
        }
        self.commit();
        self.send_pending().await?;

        let mut total = 0u64;
        loop {
            let mut chunk = BytesMut::with_capacity(CHUNK);
            if src.read_buf(&mut chunk).await? == 0 {
                return Ok(total);
            }
            total += chunk.len() as u64;
            self.send(chunk.freeze()).await?;
        }
    }
}

#[async_trait]
impl Hijack for HyperSink {
    /// Answers `101 Switching Protocols` with the current headers, then waits
    /// for hyper to release the connection.
    async fn hijack(&mut self) -> Result<Hijacked, Error> {
        if self.hijacked {
            return Err(Error::Hijacked);
        }
        let Some(upgrade) = self.upgrade.take() else {
            return Err(Error::NotSupported("hijack"));
        };
        let Some(head) = self.head.take() else {
            self.upgrade = Some(upgrade);
            return Err(Error::Committed);
        };

        let mut response = Response::new(ChannelBody::empty());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        head.send(response).map_err(|_| disconnected())?;
        self.hijacked = true;

        // Upgraded replays any bytes hyper read past the request head.
        let upgraded = upgrade.await.map_err(io::Error::other)?;
        debug!("connection hijacked");
        Ok(Hijacked { conn: Box::new(TokioIo::new(upgraded)), read_buf: Bytes::new() })
    }
}

// ── Response body ─────────────────────────────────────────────────────────────

/// A response body fed by a [`HyperSink`].
pub(crate) struct ChannelBody {
    rx: Option<mpsc::Receiver<Bytes>>,
}

impl ChannelBody {
    pub(crate) fn empty() -> Self {
        Self { rx: None }
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        match self.rx.as_mut() {
            Some(rx) => rx.poll_recv(cx).map(|chunk| chunk.map(|b| Ok(Frame::data(b)))),
            None     => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.rx.is_none()
    }
}
