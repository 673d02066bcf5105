//! # Push server: HTTP endpoint for check status reports.
//!
//! Checks report progress with `PATCH /checks/{id}` and a JSON
//! [`PushPayload`](super::PushPayload) body. The handler validates the
//! request, then hands the decoded update to the [`PushRegistry`].
//!
//! ## Responses
//! ```text
//! method != PATCH                  → 400 "invalid method"
//! path   != /checks/{id}           → 400 "invalid path"
//! id not registered                → 400 "check id not found"
//! body not a valid payload         → 400 "invalid body"
//! body id != path id               → 400 "check id mismatch"
//! stream stalled / internal error  → 500
//! forwarded                        → 200
//! ```
//!
//! ## Shutdown
//! ```text
//! token.cancel() ─► stop accepting ─► drain in-flight requests (≤ shutdown_grace)
//!                                      ├─ drained   → stopped() = Ok(())
//!                                      └─ exceeded  → abort, stopped() = Err(GraceExceeded)
//! listener error                                    → stopped() = Err(Serve)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::PushRegistry;
use super::update::{PushPayload, StatusUpdate};
use crate::error::PushError;

const CHECKS_PREFIX: &str = "/checks/";
const BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Builds the push router over `registry`.
///
/// Every request goes through a single handler so that wrong methods and
/// paths are answered with 400 rather than the router's 404/405.
pub fn router(registry: Arc<PushRegistry>) -> Router {
    Router::new()
        .fallback(handle_push)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(registry)
}

/// Running push server.
#[derive(Debug)]
pub struct PushHandle {
    local_addr: SocketAddr,
    stopped: oneshot::Receiver<Result<(), PushError>>,
}

impl PushHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://` URL of the bound listener.
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Waits until the server stops and returns how it stopped.
    pub async fn stopped(self) -> Result<(), PushError> {
        match self.stopped.await {
            Ok(res) => res,
            Err(_) => Ok(()),
        }
    }
}

/// Binds `listen` and serves the push endpoint until `token` is cancelled.
///
/// On cancellation the server stops accepting connections and waits up to
/// `shutdown_grace` for in-flight requests before closing them forcibly.
pub async fn start(
    registry: Arc<PushRegistry>,
    listen: &str,
    shutdown_grace: Duration,
    token: CancellationToken,
) -> Result<PushHandle, PushError> {
    let bind_err = |source| PushError::Bind {
        addr: listen.to_string(),
        source,
    };
    let listener = TcpListener::bind(listen).await.map_err(bind_err)?;
    let local_addr = listener.local_addr().map_err(bind_err)?;
    info!(addr = %local_addr, "push server listening");

    let app = router(registry);
    let (done_tx, done_rx) = oneshot::channel();
    let drain = token.clone();

    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(drain.cancelled_owned());
        let mut serving = tokio::spawn(async move { server.await });

        let res = tokio::select! {
            res = &mut serving => serve_result(res),
            _ = token.cancelled() => {
                match time::timeout(shutdown_grace, &mut serving).await {
                    Ok(res) => serve_result(res),
                    Err(_elapsed) => {
                        serving.abort();
                        Err(PushError::GraceExceeded { grace: shutdown_grace })
                    }
                }
            }
        };
        match &res {
            Ok(()) => info!(addr = %local_addr, "push server stopped"),
            Err(err) => warn!(addr = %local_addr, error = %err, "push server stopped with error"),
        }
        let _ = done_tx.send(res);
    });

    Ok(PushHandle {
        local_addr,
        stopped: done_rx,
    })
}

fn serve_result(res: Result<std::io::Result<()>, JoinError>) -> Result<(), PushError> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(PushError::Serve(err)),
        Err(join) => Err(PushError::Serve(std::io::Error::other(join))),
    }
}

/// Extracts `{id}` from `/checks/{id}`.
fn check_id(path: &str) -> Option<&str> {
    path.strip_prefix(CHECKS_PREFIX)
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

async fn handle_push(
    State(registry): State<Arc<PushRegistry>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    if method != Method::PATCH {
        warn!(%method, "unable to process check push notification, invalid method");
        return reject(StatusCode::BAD_REQUEST, "invalid method");
    }
    let Some(id) = check_id(uri.path()) else {
        warn!(path = uri.path(), "unable to process check push notification, invalid path");
        return reject(StatusCode::BAD_REQUEST, "invalid path");
    };
    if !registry.contains(id) {
        warn!(check_id = id, "unable to process check push notification, check id not found");
        return reject(StatusCode::BAD_REQUEST, "check id not found");
    }
    let payload: PushPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => {
            warn!(check_id = id, error = %err, "unable to process check push notification, invalid body");
            return reject(StatusCode::BAD_REQUEST, "invalid body");
        }
    };
    if payload.id != id {
        warn!(check_id = id, body_id = %payload.id, "unable to process check push notification, id mismatch");
        return reject(StatusCode::BAD_REQUEST, "check id mismatch");
    }

    match registry.deliver(StatusUpdate::from(payload)).await {
        Ok(()) => {
            debug!(check_id = id, "check push notification forwarded");
            StatusCode::OK.into_response()
        }
        Err(err) => {
            warn!(check_id = id, error = %err, "unable to forward check push notification");
            let msg = match err.status_code() {
                StatusCode::BAD_REQUEST => "check id not found",
                _ => "",
            };
            reject(err.status_code(), msg)
        }
    }
}

fn reject(status: StatusCode, msg: &'static str) -> Response {
    if msg.is_empty() {
        status.into_response()
    } else {
        (status, msg).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_id_requires_exact_shape() {
        assert_eq!(check_id("/checks/abc"), Some("abc"));
        assert_eq!(check_id("/checks/"), None);
        assert_eq!(check_id("/checks/a/b"), None);
        assert_eq!(check_id("/check/abc"), None);
        assert_eq!(check_id("/checks"), None);
    }
}
