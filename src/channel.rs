//! Per-request failure channel and the reporting primitive.
//!
//! The [`ErrorReporter`](crate::middleware::ErrorReporter) opens one
//! [`FailureChannel`] per request and threads its [`Reporter`] through the
//! request-scoped [`Request`]. Handlers never see the channel itself, only
//! the fire-and-forget [`report`] call.
//!
//! ```text
//! ErrorReporter ── FailureChannel::new() ──► Reporter ──► Request (scoped)
//!       │                                                     │
//!       │                                   handler: report(&req, err)
//!       ▼                                                     │
//! FailureChannel::close() ◄──────────── slot (last write wins) ◄┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::failure::{Failure, IntoFailure};
use crate::request::Request;

#[derive(Debug)]
struct Slot {
    failure: Option<Failure>,
    open: bool,
}

type Shared = Arc<Mutex<Slot>>;

fn lock(slot: &Shared) -> MutexGuard<'_, Slot> {
    // A panic while holding the lock cannot leave the slot half-written.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── FailureChannel ────────────────────────────────────────────────────────────

/// Holds at most one reported failure for one request.
pub(crate) struct FailureChannel {
    slot: Shared,
}

impl FailureChannel {
    pub(crate) fn new() -> Self {
        Self { slot: Arc::new(Mutex::new(Slot { failure: None, open: true })) }
    }

    /// A handle that writes into this channel.
    pub(crate) fn reporter(&self) -> Reporter {
        Reporter { slot: Some(Arc::clone(&self.slot)) }
    }

    /// Seals the channel and takes whatever was reported.
    ///
    /// Reports made through any outstanding [`Reporter`] after this point are
    /// dropped.
    pub(crate) fn close(self) -> Option<Failure> {
        let mut slot = lock(&self.slot);
        slot.open = false;
        slot.failure.take()
    }
}

// ── Reporter ──────────────────────────────────────────────────────────────────

/// Write handle for the current request's failure channel.
///
/// Cheap to clone; a clone may be moved into a spawned task. A report only
/// counts if it lands before the handler returns; later ones are dropped.
#[derive(Clone, Debug, Default)]
pub struct Reporter {
    slot: Option<Shared>,
}

impl Reporter {
    /// Records `failure`, replacing any earlier report for this request.
    ///
    /// Never fails and never blocks. A no-op when no dispatcher is bound or
    /// when `failure` converts to nothing (e.g. `None::<HttpError>`).
    pub fn report(&self, failure: impl IntoFailure) {
        let Some(slot) = &self.slot else { return };
        let Some(failure) = failure.into_failure() else { return };

        let mut slot = lock(slot);
        if slot.open {
            slot.failure = Some(failure);
        } else {
            debug!(%failure, "failure reported after the response was decided; dropped");
        }
    }

    /// Whether an [`ErrorReporter`](crate::middleware::ErrorReporter) is
    /// listening for this request.
    pub fn is_bound(&self) -> bool {
        self.slot.is_some()
    }
}

/// Reports a failure for `req` without touching the response.
///
/// If the response has not been committed when the handler returns, the
/// [`ErrorReporter`](crate::middleware::ErrorReporter) replaces it with a
/// rendering of `failure`. Safe to call when no reporter middleware is
/// installed: the call then does nothing.
///
/// ```rust
/// use deferr::{report, BoxFuture, HttpError, Request, ResponseSink};
///
/// fn get_user<'a>(req: &'a Request, _w: &'a mut dyn ResponseSink) -> BoxFuture<'a, ()> {
///     Box::pin(async move {
///         report(req, HttpError::not_found(Some("user missing")));
///     })
/// }
/// ```
pub fn report(req: &Request, failure: impl IntoFailure) {
    req.reporter().report(failure);
}
