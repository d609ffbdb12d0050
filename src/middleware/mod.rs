//! Middleware layer.
//!
//! Middleware wraps a [`Handler`](crate::Handler) and is itself one, so
//! layers nest like any other handler:
//!
//! ```rust,no_run
//! use deferr::middleware::ErrorReporter;
//! use deferr::{Router, Server};
//!
//! # async fn run() -> Result<(), deferr::Error> {
//! let app = ErrorReporter::new(Router::new());
//! Server::bind("0.0.0.0:3000").serve(app).await
//! # }
//! ```
//!
//! Built-in middleware:
//! - [`ErrorReporter`]: replaces uncommitted responses with a rendering of
//!   the failure a handler [`report`](crate::report)ed.

mod report;

pub use report::{ErrorReporter, Outcome};
