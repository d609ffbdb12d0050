//! Handler trait.
//!
//! # Writing a handler
//!
//! A handler receives the request and a mutable [`ResponseSink`], and returns
//! nothing. Failures are reported out-of-band with [`report`](crate::report);
//! the handler's signature never changes because of them.
//!
//! ```rust
//! use deferr::{report, BoxFuture, HttpError, Request, ResponseSink};
//!
//! fn get_user<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
//!     Box::pin(async move {
//!         let Some(id) = req.param("id") else {
//!             return report(req, HttpError::bad_request(Some("missing id")));
//!         };
//!         if w.write_all(format!(r#"{{"id":"{id}"}}"#).as_bytes()).await.is_err() {
//!             // client went away; nothing left to do
//!         }
//!     })
//! }
//! ```
//!
//! # Why the explicit lifetime
//!
//! The returned future borrows both the request and the sink, so it cannot
//! be `'static`. Naming the lifetime `'a` ties all three together:
//!
//! ```text
//! fn name<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()>
//! ```
//!
//! Any such `fn` is a [`Handler`] through the blanket impl below. The
//! router and the middleware implement it directly, so they nest.

use std::future::Future;
use std::pin::Pin;

use crate::request::Request;
use crate::sink::ResponseSink;

/// A heap-allocated, type-erased future borrowing for `'a`.
///
/// `Pin<Box<…>>` because the runtime polls it in place; `Send` so tokio may
/// move it across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can answer a request by writing into a sink.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a Request, &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
        (self)(req, w)
    }
}
