//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

use crate::channel::Reporter;

#[derive(Debug)]
struct Head {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

/// An incoming HTTP request with its body already collected.
///
/// Cheap to clone: the head and body are shared. Each clone may carry a
/// different [`Reporter`], which is how a request-scoped failure channel is
/// bound for one stage of processing without touching the others.
#[derive(Clone, Debug)]
pub struct Request {
    head: Arc<Head>,
    params: Arc<HashMap<String, String>>,
    reporter: Reporter,
}

impl Request {
    pub(crate) fn new(parts: http::request::Parts, body: Bytes) -> Self {
        let head = Head {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        };
        Self { head: Arc::new(head), params: Arc::default(), reporter: Reporter::default() }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn version(&self) -> Version { self.head.version }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn body(&self) -> &[u8] { &self.head.body }

    /// Case-insensitive header lookup. `None` for missing or non-ASCII values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The failure reporter bound to this request. Prefer [`report`](crate::report)
    /// unless the handle must outlive the borrow of the request.
    pub fn reporter(&self) -> &Reporter { &self.reporter }

    pub(crate) fn with_params(&self, params: HashMap<String, String>) -> Self {
        Self { params: Arc::new(params), ..self.clone() }
    }

    pub(crate) fn with_reporter(&self, reporter: Reporter) -> Self {
        Self { reporter, ..self.clone() }
    }
}

/// Builds a request directly, bypassing the server. Handy in tests.
impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body)
    }
}
