//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. You register a path, you
//! get a handler. Unmatched requests become `404` (or `405` when the path
//! exists under another method), reported through the failure channel when an
//! [`ErrorReporter`](crate::middleware::ErrorReporter) is listening so they
//! render like any other failure.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::ALLOW;
use http::{HeaderValue, Method};
use matchit::Router as MatchitRouter;

use crate::channel::report;
use crate::failure::HttpError;
use crate::handler::{BoxFuture, Handler};
use crate::request::Request;
use crate::sink::ResponseSink;

type SharedHandler = Arc<dyn Handler>;

/// The application router.
///
/// Build it once at startup; pass it (usually wrapped in an
/// [`ErrorReporter`](crate::middleware::ErrorReporter)) to
/// [`Server::serve`](crate::Server::serve). Each registration returns `self`
/// so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<SharedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is malformed or conflicts with an existing route.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(handler))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(SharedHandler, HashMap<String, String>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((Arc::clone(matched.value), params))
    }

    /// Methods with a route matching `path`, sorted for a stable `Allow` header.
    fn allowed(&self, path: &str) -> Vec<&str> {
        let mut methods: Vec<&str> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.as_str())
            .collect();
        methods.sort_unstable();
        methods
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Handler for Router {
    fn call<'a>(&'a self, req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some((handler, params)) = self.lookup(req.method(), req.path()) {
                let req = req.with_params(params);
                return handler.call(&req, w).await;
            }

            let allowed = self.allowed(req.path());
            let failure = if allowed.is_empty() {
                HttpError::not_found(None)
            } else {
                let failure = HttpError::method_not_allowed(None);
                match HeaderValue::from_str(&allowed.join(", ")) {
                    Ok(value) => failure.with_header(ALLOW, value),
                    Err(_) => failure,
                }
            };

            if req.reporter().is_bound() {
                report(req, failure);
            } else {
                for (name, value) in failure.headers() {
                    w.headers_mut().insert(name, value.clone());
                }
                w.set_status(failure.status());
            }
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("methods", &self.routes.keys().collect::<Vec<_>>()).finish()
    }
}
