//! # deferr
//!
//! Out-of-band failure reporting for HTTP handlers.
//!
//! ## The contract
//!
//! A handler writes its response into a sink and returns nothing. When it
//! hits a failure it [`report`]s it and returns; it does not build an error
//! response itself. The [`ErrorReporter`](middleware::ErrorReporter) wrapped
//! around it then decides:
//!
//! - **nothing reported**: the handler's response stands.
//! - **reported, response still untouched**: headers are cleared and the
//!   failure is rendered (JSON, or an HTML fragment for browsers).
//! - **reported, but a status or body byte already went out**, or the
//!   connection was hijacked: the failure is dropped. A response is never
//!   written twice.
//!
//! Only [`HttpError`]s reach the client with their own status and message.
//! Any other reported error becomes a bare `500 Internal Server Error`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use deferr::middleware::ErrorReporter;
//! use deferr::{report, BoxFuture, HttpError, Request, ResponseSink, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), deferr::Error> {
//!     let app = Router::new().get("/users/{id}", get_user);
//!
//!     Server::bind("0.0.0.0:3000").serve(ErrorReporter::new(app)).await
//! }
//!
//! fn get_user<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
//!     Box::pin(async move {
//!         if req.param("id") != Some("42") {
//!             return report(req, HttpError::not_found(Some("no such user")));
//!         }
//!         let _ = w.write_all(br#"{"id":"42"}"#).await;
//!     })
//! }
//! ```

mod channel;
mod error;
mod failure;
mod handler;
mod recorder;
mod request;
mod router;
mod server;
mod sink;
mod status;
mod transport;
mod writer;

pub mod middleware;
pub mod render;

pub use channel::{report, Reporter};
pub use error::Error;
pub use failure::{BoxError, Failure, HttpError, IntoFailure};
pub use handler::{BoxFuture, Handler};
pub use recorder::Recorder;
pub use request::Request;
pub use router::Router;
pub use server::Server;
pub use sink::{BulkTransfer, Connection, Flush, Hijack, Hijacked, Push, PushOptions, ResponseSink};
pub use writer::InterceptingWriter;
