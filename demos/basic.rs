//! Minimal deferr example: JSON endpoints that report failures instead of
//! writing error responses themselves.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i http://localhost:3000/users/7                       # 404, JSON
//!   curl -i -H 'accept: text/html' http://localhost:3000/users/7 # 404, HTML fragment
//!   curl -i -X POST http://localhost:3000/users                  # 400
//!   curl -i http://localhost:3000/export                         # 500, detail stays in the log
//!   curl -i http://localhost:3000/stream                         # 200, late failure dropped

use std::io;

use deferr::middleware::ErrorReporter;
use deferr::{report, BoxFuture, Flush, HttpError, Request, ResponseSink, Router, Server};
use http::{HeaderValue, StatusCode};
use http::header::{CONTENT_TYPE, LOCATION};

#[tokio::main]
async fn main() -> Result<(), deferr::Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let app = Router::new()
        .get("/users/{id}", get_user)
        .post("/users",     create_user)
        .get("/export",     export)
        .get("/stream",     stream);

    Server::bind("0.0.0.0:3000")
        .serve(ErrorReporter::new(app))
        .await
}

// GET /users/{id}
fn get_user<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let id = req.param("id").unwrap_or_default();
        if id != "42" {
            return report(req, HttpError::not_found(Some(&format!("user {id} not found"))));
        }
        w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = w.write_all(br#"{"id":"42","name":"alice"}"#).await;
    })
}

// POST /users
fn create_user<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        if req.body().is_empty() {
            return report(req, HttpError::bad_request(Some("empty body")));
        }
        w.headers_mut().insert(LOCATION, HeaderValue::from_static("/users/99"));
        w.set_status(StatusCode::CREATED);
    })
}

// GET /export: any error type can be reported; the client only sees a 500.
fn export<'a>(req: &'a Request, _w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "warehouse at 10.0.0.3 refused");
        report(req, err);
    })
}

// GET /stream: once bytes are out, a reported failure can only be logged.
fn stream<'a>(req: &'a Request, w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let _ = w.write_all(b"partial data\n").await;
        if let Some(flusher) = w.flusher() {
            let _ = flusher.flush().await;
        }
        report(req, HttpError::internal_server_error(Some("upstream hiccup")));
    })
}
