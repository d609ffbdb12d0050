//! Deferred error responses.
//!
//! # Lifecycle of one request
//!
//! ```text
//! ErrorReporter::handle
//!   ├─ open FailureChannel, bind its Reporter into a scoped Request
//!   ├─ wrap the real sink in an InterceptingWriter
//!   ├─ await next.call(scoped, writer)          ← handler may report() / write
//!   └─ decide
//!        hijacked           → PassThrough  (connection belongs to the caller)
//!        committed          → PassThrough  (bytes are on the wire; failure dropped)
//!        nothing reported   → PassThrough
//!        otherwise          → clear headers, render failure → Substituted
//! ```
//!
//! Clearing the headers matters: a handler may have set `content-length`
//! for a body it never wrote, and the client would wait for it forever.
//!
//! # Buffered mode
//!
//! [`ErrorReporter::buffered`] runs the next stage against an in-memory
//! [`Recorder`] and only replays it if nothing was reported, so a failure
//! can replace even a fully written response. The price is memory
//! proportional to the response, and no streaming, hijack, or push.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::channel::FailureChannel;
use crate::error::Error;
use crate::failure::Failure;
use crate::handler::{BoxFuture, Handler};
use crate::recorder::Recorder;
use crate::render::{Renderer, default_renderer};
use crate::request::Request;
use crate::sink::ResponseSink;
use crate::writer::InterceptingWriter;

/// How a request ended, from the reporter's point of view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The next stage's response stands as written.
    PassThrough,
    /// The response was replaced by a rendering of the reported failure.
    Substituted,
}

/// Middleware that turns [`report`](crate::report)ed failures into error
/// responses, as long as the response is still replaceable.
pub struct ErrorReporter<H> {
    next: H,
    renderer: Arc<dyn Renderer>,
    buffered: bool,
}

impl<H: Handler> ErrorReporter<H> {
    /// Wraps `next`, rendering with the process-wide
    /// [default renderer](crate::render::default_renderer) as it is now.
    pub fn new(next: H) -> Self {
        Self { next, renderer: default_renderer(), buffered: false }
    }

    /// Renders failures with `renderer` instead of the default.
    pub fn renderer(mut self, renderer: impl Renderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// Buffers the whole response in memory; see the [module docs](self).
    pub fn buffered(mut self) -> Self {
        self.buffered = true;
        self
    }

    /// Runs `next` for one request and decides the final response.
    ///
    /// Errors are transport faults from replaying or rendering; the response
    /// cannot be rescued at that point.
    pub async fn handle(&self, req: &Request, sink: &mut dyn ResponseSink) -> Result<Outcome, Error> {
        let channel = FailureChannel::new();
        let scoped = req.with_reporter(channel.reporter());

        if self.buffered {
            return self.handle_buffered(req, &scoped, channel, sink).await;
        }

        let mut writer = InterceptingWriter::new(&mut *sink);
        self.next.call(&scoped, &mut writer).await;
        let (committed, hijacked, status) =
            (writer.is_committed(), writer.is_hijacked(), writer.status());

        let Some(failure) = channel.close() else {
            return Ok(Outcome::PassThrough);
        };
        if hijacked {
            debug!(%failure, "failure reported on a hijacked connection; dropped");
            return Ok(Outcome::PassThrough);
        }
        if committed {
            debug!(?status, %failure, "failure reported after the response was committed; dropped");
            return Ok(Outcome::PassThrough);
        }
        self.substitute(req, sink, failure).await
    }

    async fn handle_buffered(
        &self,
        req: &Request,
        scoped: &Request,
        channel: FailureChannel,
        sink: &mut dyn ResponseSink,
    ) -> Result<Outcome, Error> {
        let mut buffer = Recorder::with_headers(sink.headers().clone());
        self.next.call(scoped, &mut buffer).await;

        match channel.close() {
            Some(failure) => self.substitute(req, sink, failure).await,
            None => {
                buffer.replay(sink).await?;
                Ok(Outcome::PassThrough)
            }
        }
    }

    async fn substitute(
        &self,
        req: &Request,
        sink: &mut dyn ResponseSink,
        failure: Failure,
    ) -> Result<Outcome, Error> {
        debug!(%failure, path = req.path(), "replacing response with reported failure");
        sink.headers_mut().clear();
        self.renderer.render(sink, req, Some(&failure)).await?;
        Ok(Outcome::Substituted)
    }
}

impl<H: Handler> Handler for ErrorReporter<H> {
    fn call<'a>(&'a self, req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(e) = self.handle(req, w).await {
                warn!(error = %e, path = req.path(), "could not write response");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use http::{HeaderMap, HeaderValue, StatusCode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::channel::report;
    use crate::failure::HttpError;
    use crate::render::DefaultRenderer;
    use crate::sink::{Flush, Hijack, Hijacked};

    // ── Fixtures ──────────────────────────────────────────────────────────────

    fn get() -> Request {
        Request::from(http::Request::get("/users/7").body(Bytes::new()).unwrap())
    }

    /// Counts invocations, then defers to the default renderer.
    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    impl Counting {
        fn calls(&self) -> usize { self.0.load(Ordering::SeqCst) }
    }

    #[async_trait]
    impl Renderer for Counting {
        async fn render(
            &self,
            sink: &mut dyn ResponseSink,
            req: &Request,
            failure: Option<&Failure>,
        ) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            DefaultRenderer.render(sink, req, failure).await
        }
    }

    struct Teapot;

    #[async_trait]
    impl Renderer for Teapot {
        async fn render(
            &self,
            sink: &mut dyn ResponseSink,
            _req: &Request,
            failure: Option<&Failure>,
        ) -> Result<(), Error> {
            sink.set_status(StatusCode::IM_A_TEAPOT);
            let text = failure.map(ToString::to_string).unwrap_or_default();
            sink.write_all(text.as_bytes()).await
        }
    }

    /// A recorder that can also be hijacked.
    #[derive(Default)]
    struct Upgradable {
        rec: Recorder,
        peer: Option<DuplexStream>,
    }

    #[async_trait]
    impl ResponseSink for Upgradable {
        fn headers(&self) -> &HeaderMap { self.rec.headers() }
        fn headers_mut(&mut self) -> &mut HeaderMap { self.rec.headers_mut() }
        fn set_status(&mut self, status: StatusCode) { self.rec.set_status(status) }
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Error> { self.rec.write(buf).await }
        fn hijacker(&mut self) -> Option<&mut dyn Hijack> { Some(self) }
    }

    #[async_trait]
    impl Hijack for Upgradable {
        async fn hijack(&mut self) -> Result<Hijacked, Error> {
            let (ours, theirs) = tokio::io::duplex(64);
            self.peer = Some(theirs);
            Ok(Hijacked { conn: Box::new(ours), read_buf: Bytes::new() })
        }
    }

    /// Accepts headers, fails every body write.
    #[derive(Default)]
    struct Disconnected(Recorder);

    #[async_trait]
    impl ResponseSink for Disconnected {
        fn headers(&self) -> &HeaderMap { self.0.headers() }
        fn headers_mut(&mut self) -> &mut HeaderMap { self.0.headers_mut() }
        fn set_status(&mut self, status: StatusCode) { self.0.set_status(status) }
        async fn write(&mut self, _buf: &[u8]) -> Result<usize, Error> {
            Err(io::Error::from(io::ErrorKind::ConnectionReset).into())
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    fn user_missing<'a>(req: &'a Request, _w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move { report(req, HttpError::not_found(Some("user missing"))) })
    }

    fn ok_then_report<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            w.set_status(StatusCode::OK);
            w.write_all(b"ok").await.unwrap();
            report(req, Failure::other("late fault"));
        })
    }

    fn report_then_hijack<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            report(req, HttpError::bad_request(Some("bad id")));
            let mut hijacked = w.hijacker().unwrap().hijack().await.unwrap();
            hijacked.conn.write_all(b"raw").await.unwrap();
            assert!(matches!(w.write(b"x").await, Err(Error::Hijacked)));
        })
    }

    fn internal_fault<'a>(req: &'a Request, _w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            report(req, io::Error::other("connection pool exhausted at 10.0.0.3"));
        })
    }

    fn speculative_headers<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            w.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));
            w.headers_mut().insert("x-user-etag", HeaderValue::from_static("\"v7\""));
            report(req, HttpError::conflict(None));
        })
    }

    fn silent<'a>(_req: &'a Request, _w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn empty_report<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            report(req, None::<HttpError>);
            w.headers_mut().insert("x-kept", HeaderValue::from_static("1"));
        })
    }

    fn partial_then_report<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            w.write_all(b"[1,2,").await.unwrap();
            report(req, HttpError::internal_server_error(None));
        })
    }

    fn flush_then_report<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            w.flusher().unwrap().flush().await.unwrap();
            report(req, HttpError::bad_gateway(None));
        })
    }

    // ── Direct mode ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn reported_failure_replaces_empty_response() {
        let reporter = ErrorReporter::new(user_missing).renderer(DefaultRenderer);
        let mut sink = Recorder::new();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::Substituted);
        assert_eq!(sink.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(sink.body(), br#"{"status":404,"message":"user missing"}"#);
    }

    #[tokio::test]
    async fn report_after_commit_is_dropped() {
        let counting = Counting::default();
        let reporter = ErrorReporter::new(ok_then_report).renderer(counting.clone());
        let mut sink = Recorder::new();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::PassThrough);
        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.body(), b"ok");
        assert_eq!(counting.calls(), 0);
    }

    #[tokio::test]
    async fn hijack_wins_over_reported_failure() {
        let counting = Counting::default();
        let reporter = ErrorReporter::new(report_then_hijack).renderer(counting.clone());
        let mut sink = Upgradable::default();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::PassThrough);
        assert_eq!(counting.calls(), 0);
        assert_eq!(sink.rec.status(), None);
        assert!(sink.rec.body().is_empty());

        let mut raw = [0u8; 3];
        sink.peer.take().unwrap().read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw, b"raw");
    }

    #[tokio::test]
    async fn unrecognized_failure_renders_generic_500() {
        let reporter = ErrorReporter::new(internal_fault).renderer(DefaultRenderer);
        let mut sink = Recorder::new();

        reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(sink.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let body = std::str::from_utf8(sink.body()).unwrap();
        assert_eq!(body, r#"{"status":500,"message":"Internal Server Error"}"#);
        assert!(!body.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn speculative_headers_are_cleared() {
        let reporter = ErrorReporter::new(speculative_headers).renderer(DefaultRenderer);
        let mut sink = Recorder::new();
        sink.headers_mut().insert("x-from-outer-layer", HeaderValue::from_static("1"));

        reporter.handle(&get(), &mut sink).await.unwrap();

        let sent = sink.sent_headers();
        assert_eq!(sink.status(), Some(StatusCode::CONFLICT));
        assert_eq!(sent.len(), 2, "only renderer headers survive: {sent:?}");
        assert_eq!(sent[CONTENT_LENGTH], sink.body().len().to_string().as_str());
        assert!(sent.contains_key(CONTENT_TYPE));
    }

    #[tokio::test]
    async fn nothing_reported_never_renders() {
        let counting = Counting::default();
        let reporter = ErrorReporter::new(silent).renderer(counting.clone());
        let mut sink = Recorder::new();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::PassThrough);
        assert_eq!(counting.calls(), 0);
        assert_eq!(sink.status(), None);
    }

    #[tokio::test]
    async fn empty_report_is_no_report() {
        let counting = Counting::default();
        let reporter = ErrorReporter::new(empty_report).renderer(counting.clone());
        let mut sink = Recorder::new();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::PassThrough);
        assert_eq!(counting.calls(), 0);
        assert_eq!(sink.headers()["x-kept"], "1");
    }

    #[tokio::test]
    async fn partial_body_is_never_mixed_with_error() {
        let reporter = ErrorReporter::new(partial_then_report).renderer(DefaultRenderer);
        let mut sink = Recorder::new();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::PassThrough);
        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.body(), b"[1,2,");
    }

    #[tokio::test]
    async fn flush_commits_the_response() {
        let reporter = ErrorReporter::new(flush_then_report).renderer(DefaultRenderer);
        let mut sink = Recorder::new();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::PassThrough);
        assert!(sink.is_flushed());
        assert_eq!(sink.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn custom_renderer_chooses_the_response() {
        let reporter = ErrorReporter::new(internal_fault).renderer(Teapot);
        let mut sink = Recorder::new();

        reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(sink.status(), Some(StatusCode::IM_A_TEAPOT));
        assert_eq!(sink.body(), b"connection pool exhausted at 10.0.0.3");
    }

    #[tokio::test]
    async fn render_transport_fault_propagates() {
        let reporter = ErrorReporter::new(user_missing).renderer(DefaultRenderer);
        let mut sink = Disconnected::default();

        let err = reporter.handle(&get(), &mut sink).await.unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn handler_without_reporter_is_unaffected() {
        let mut sink = Recorder::new();
        Handler::call(&user_missing, &get(), &mut sink).await;
        assert_eq!(sink.status(), None);
    }

    #[tokio::test]
    async fn reporter_is_itself_a_handler() {
        let app = ErrorReporter::new(user_missing).renderer(DefaultRenderer);
        let mut sink = Recorder::new();

        app.call(&get(), &mut sink).await;
        assert_eq!(sink.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn inner_reporter_shadows_outer() {
        let outer_count = Counting::default();
        let app = ErrorReporter::new(ErrorReporter::new(user_missing).renderer(Teapot))
            .renderer(outer_count.clone());
        let mut sink = Recorder::new();

        let outcome = app.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::PassThrough);
        assert_eq!(outer_count.calls(), 0);
        assert_eq!(sink.status(), Some(StatusCode::IM_A_TEAPOT));
    }

    // ── Buffered mode ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn buffered_mode_replaces_a_written_response() {
        let reporter = ErrorReporter::new(partial_then_report).renderer(DefaultRenderer).buffered();
        let mut sink = Recorder::new();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::Substituted);
        assert_eq!(sink.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!sink.body().starts_with(b"[1,2,"));
    }

    #[tokio::test]
    async fn buffered_mode_replays_when_nothing_reported() {
        let reporter = ErrorReporter::new(empty_report).renderer(DefaultRenderer).buffered();
        let mut sink = Recorder::new();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::PassThrough);
        assert_eq!(sink.status(), None);
        assert_eq!(sink.headers()["x-kept"], "1");
    }

    #[tokio::test]
    async fn buffered_mode_cannot_hijack() {
        fn try_hijack<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                if w.hijacker().is_none() {
                    report(req, HttpError::upgrade_required(None));
                }
            })
        }

        let reporter = ErrorReporter::new(try_hijack).renderer(DefaultRenderer).buffered();
        let mut sink = Upgradable::default();

        let outcome = reporter.handle(&get(), &mut sink).await.unwrap();

        assert_eq!(outcome, Outcome::Substituted);
        assert_eq!(sink.rec.status(), Some(StatusCode::UPGRADE_REQUIRED));
        assert!(sink.peer.is_none());
    }
}
