//! One accepted connection: HTTP/1.1 serving, per-request write deadline,
//! request body cap, keep-alive idle watchdog, and graceful close on
//! shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body as _, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Dispatcher;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Limits {
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
    pub max_body: usize,
}

pub(crate) async fn serve(
    stream: TcpStream,
    remote_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    limits: Limits,
    mut stop: watch::Receiver<bool>,
) {
    let activity = Arc::new(Activity::new());

    let svc = {
        let activity = Arc::clone(&activity);
        // Called once per request on the connection.
        service_fn(move |req| {
            let dispatcher = Arc::clone(&dispatcher);
            let activity = Arc::clone(&activity);
            async move {
                let _busy = activity.begin();
                let res = handle(&dispatcher, req, remote_addr, limits.max_body);
                match tokio::time::timeout(limits.write, res).await {
                    Ok(res) => Ok(res),
                    Err(_) => {
                        warn!(peer = %remote_addr, timeout = ?limits.write, "write timeout elapsed, closing connection");
                        Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout elapsed"))
                    }
                }
            }
        })
    };

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(limits.read)
        .keep_alive(true)
        .serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    if e.is_timeout() || e.is_incomplete_message() {
                        debug!(peer = %remote_addr, "connection closed: {e}");
                    } else if !e.is_user() {
                        warn!(peer = %remote_addr, "connection error: {e}");
                    }
                }
                break;
            }
            // Sender dropped or flipped: either way the server is going away.
            _ = stop.changed(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            () = activity.idle(limits.idle), if !closing => {
                debug!(peer = %remote_addr, "closing idle keep-alive connection");
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

async fn handle(
    dispatcher: &Dispatcher,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    max_body: usize,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let method = match Method::try_from(&parts.method) {
        Ok(m) => m,
        Err(e) => return Response::error(StatusCode::METHOD_NOT_ALLOWED, e).into_hyper(),
    };

    let res = match read_body(body, max_body).await {
        Ok(body) => {
            let req = Request::from_parts(method, parts, body, remote_addr);
            dispatcher.dispatch(req).await
        }
        Err((status, reason)) => {
            debug!(peer = %remote_addr, %status, "refusing request: {reason}");
            let req = Request::from_parts(method, parts, Bytes::new(), remote_addr);
            dispatcher.reject(req, status, reason).await
        }
    };
    res.into_hyper()
}

/// Buffers the body, refusing anything over `max_body` bytes. A declared
/// `Content-Length` over the cap is refused before a byte is read.
async fn read_body(body: Incoming, max_body: usize) -> Result<Bytes, (StatusCode, &'static str)> {
    const TOO_LARGE: (StatusCode, &str) = (StatusCode::PAYLOAD_TOO_LARGE, "request body too large");

    if body.size_hint().lower() > u64::try_from(max_body).unwrap_or(u64::MAX) {
        return Err(TOO_LARGE);
    }
    match Limited::new(body, max_body).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(TOO_LARGE),
        Err(_) => Err((StatusCode::BAD_REQUEST, "unreadable request body")),
    }
}

// ── Idle tracking ─────────────────────────────────────────────────────────────

/// Requests in flight on one connection and when the last one finished.
struct Activity {
    epoch: Instant,
    in_flight: AtomicUsize,
    last_done_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self { epoch: Instant::now(), in_flight: AtomicUsize::new(0), last_done_ms: AtomicU64::new(0) }
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Busy(Arc::clone(self))
    }

    /// Resolves once no request has been in flight for `timeout`.
    async fn idle(&self, timeout: Duration) {
        loop {
            let deadline = if self.in_flight.load(Ordering::Acquire) == 0 {
                let last = Duration::from_millis(self.last_done_ms.load(Ordering::Acquire));
                let deadline = self.epoch + last + timeout;
                if Instant::now() >= deadline {
                    return;
                }
                deadline
            } else {
                Instant::now() + timeout
            };
            tokio::time::sleep_until(deadline).await;
        }
    }
}

/// Marks a request in flight until dropped.
struct Busy(Arc<Activity>);

impl Drop for Busy {
    fn drop(&mut self) {
        let now = u64::try_from(self.0.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.0.last_done_ms.store(now, Ordering::Release);
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
