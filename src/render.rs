//! Turning a reported failure into a response.
//!
//! [`Renderer`] is the pluggable half of the
//! [`ErrorReporter`](crate::middleware::ErrorReporter): once it decides a
//! response can be replaced, it clears the sink's headers and calls
//! `render` exactly once.
//!
//! [`DefaultRenderer`] does simple content negotiation:
//!
//! | `Accept` contains                      | Content-Type                      | Body                                 |
//! |----------------------------------------|-----------------------------------|--------------------------------------|
//! | `text/html` or `application/xhtml+xml` | `text/html; charset=utf-8`        | `<div class="http-error">…</div>`    |
//! | anything else                          | `application/json; charset=utf-8` | `{"status":404,"message":"…"}`       |
//!
//! The HTML fragment is meant to be swapped into a page as-is (htmx and
//! friends).

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};

use crate::error::Error;
use crate::failure::{Failure, HttpError};
use crate::request::Request;
use crate::sink::ResponseSink;

const HTML: &str = "text/html; charset=utf-8";
const JSON: &str = "application/json; charset=utf-8";

/// Writes an error response for a failure.
///
/// Free to set any status, headers, and body. `failure` is `None` when the
/// renderer is invoked without one; implementations should then behave as
/// for an unrecognized failure.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    async fn render(
        &self,
        sink: &mut dyn ResponseSink,
        req: &Request,
        failure: Option<&Failure>,
    ) -> Result<(), Error>;
}

/// JSON by default, an HTML fragment for browsers.
///
/// Failures other than [`HttpError`] become a bare `500 Internal Server
/// Error`; their own message is never written.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRenderer;

#[async_trait]
impl Renderer for DefaultRenderer {
    async fn render(
        &self,
        sink: &mut dyn ResponseSink,
        req: &Request,
        failure: Option<&Failure>,
    ) -> Result<(), Error> {
        let err = match failure.and_then(Failure::as_http) {
            Some(e) => Cow::Borrowed(e),
            None => Cow::Owned(HttpError::internal_server_error(None)),
        };

        let (content_type, body) = if prefers_html(req.headers()) {
            (HTML, format!(r#"<div class="http-error">{}</div>"#, escape(err.message())).into_bytes())
        } else {
            (JSON, serde_json::to_vec(&*err)?)
        };

        // Headers must be in place before the status commits them.
        let headers = sink.headers_mut();
        for (name, value) in err.headers() {
            headers.append(name, value.clone());
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        sink.set_status(err.status());
        sink.write_all(&body).await
    }
}

fn prefers_html(headers: &HeaderMap) -> bool {
    headers.get_all(ACCEPT).iter().filter_map(|v| v.to_str().ok()).any(|accept| {
        accept.contains("text/html") || accept.contains("application/xhtml+xml")
    })
}

fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&'  => out.push_str("&amp;"),
            '<'  => out.push_str("&lt;"),
            '>'  => out.push_str("&gt;"),
            '"'  => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _    => out.push(c),
        }
    }
    Cow::Owned(out)
}

// ── Process-wide default ──────────────────────────────────────────────────────

static DEFAULT_RENDERER: OnceLock<Arc<dyn Renderer>> = OnceLock::new();

/// Installs the renderer used by [`ErrorReporter::new`](crate::middleware::ErrorReporter::new).
///
/// Call once at startup, before building any `ErrorReporter`: each reporter
/// captures the default when it is constructed, never while serving. Returns
/// [`Error::RendererAlreadySet`] on a second call, or if the default was
/// already read.
pub fn set_default_renderer(renderer: impl Renderer) -> Result<(), Error> {
    DEFAULT_RENDERER.set(Arc::new(renderer)).map_err(|_| Error::RendererAlreadySet)
}

/// The process-wide default renderer ([`DefaultRenderer`] unless replaced).
pub fn default_renderer() -> Arc<dyn Renderer> {
    Arc::clone(DEFAULT_RENDERER.get_or_init(|| Arc::new(DefaultRenderer)))
}
