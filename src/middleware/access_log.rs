//! Access-log middleware.
//!
//! Emits exactly one `tracing` event per request, after the inner chain has
//! produced a response. The message reads
//!
//! ```text
//! HTTP/1.1 1718000000000000000 GET /health 127.0.0.1:53412 curl/8.5.0
//! ```
//!
//! and the same values are attached as structured fields. Events use the
//! [`TARGET`] target so they can be filtered independently, e.g.
//! `RUST_LOG=waypost::access=info`.
//!
//! A request whose future is dropped before it produced a response (the
//! write timeout fired, the connection was aborted, the handler panicked)
//! is still logged once, with `status=-`. There is no panic recovery here.

use std::fmt;
use std::net::SocketAddr;

use http::StatusCode;

use super::{BoxFuture, Middleware, Next};
use crate::method::Method;
use crate::request::Request;

pub const TARGET: &str = "waypost::access";

const UNKNOWN_ID: &str = "unknown";

#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLog;

impl AccessLog {
    pub fn new() -> Self {
        Self
    }
}

/// The request facts one access-log line is made of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub protocol: &'static str,
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub remote_addr: SocketAddr,
    pub user_agent: String,
}

impl AccessRecord {
    pub fn from_request(req: &Request) -> Self {
        Self {
            protocol: req.protocol(),
            request_id: req
                .request_id()
                .map_or_else(|| UNKNOWN_ID.to_owned(), |id| id.to_string()),
            method: req.method(),
            path: req.path().to_owned(),
            remote_addr: req.remote_addr(),
            user_agent: req.user_agent().unwrap_or("-").to_owned(),
        }
    }
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.protocol, self.request_id, self.method, self.path, self.remote_addr, self.user_agent
        )
    }
}

impl Middleware for AccessLog {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let entry = Entry(Some(AccessRecord::from_request(&req)));
        Box::pin(async move {
            let res = next.run(req).await;
            entry.finish(res.status_code());
            res
        })
    }
}

/// Writes the line when finished, or with no status when dropped first.
struct Entry(Option<AccessRecord>);

impl Entry {
    fn finish(mut self, status: StatusCode) {
        if let Some(record) = self.0.take() {
            emit(&record, Some(status));
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        if let Some(record) = self.0.take() {
            emit(&record, None);
        }
    }
}

fn emit(record: &AccessRecord, status: Option<StatusCode>) {
    let status = status.map_or_else(|| "-".to_owned(), |s| s.as_u16().to_string());
    tracing::info!(
        target: TARGET,
        request_id = %record.request_id,
        method = %record.method,
        path = %record.path,
        remote_addr = %record.remote_addr,
        user_agent = %record.user_agent,
        status = %status,
        "{record}"
    );
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use http::{HeaderValue, StatusCode, header};
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{RequestIdLayer, X_REQUEST_ID};
    use crate::response::Response;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn chain(layers: Vec<Arc<dyn Middleware>>) -> impl Fn(Request) -> BoxFuture {
        let stack: Arc<[Arc<dyn Middleware>]> = Arc::from(layers);
        let endpoint = (|_req: Request| async { Response::status(StatusCode::NO_CONTENT) })
            .into_boxed_handler();
        move |req| Next::new(Arc::clone(&stack), Arc::clone(&endpoint)).run(req)
    }

    fn health_request() -> Request {
        Request::new(Method::Get, "/health", "127.0.0.1:53412".parse().unwrap())
            .with_header(header::USER_AGENT, HeaderValue::from_static("probe/1.0"))
    }

    #[test]
    fn record_renders_protocol_prefix_first() {
        let mut req = health_request();
        req.set_request_id(crate::request::RequestId::new("abc"));
        let record = AccessRecord::from_request(&req);
        assert_eq!(
            record.to_string(),
            "HTTP/1.1 abc GET /health 127.0.0.1:53412 probe/1.0"
        );
    }

    #[test]
    fn record_falls_back_without_tracer() {
        let req = Request::new(Method::Post, "/api/v0/login", "10.0.0.1:1".parse().unwrap());
        let record = AccessRecord::from_request(&req);
        assert_eq!(record.request_id, "unknown");
        assert_eq!(record.user_agent, "-");
    }

    #[tokio::test]
    async fn logs_once_after_the_handler_with_correlation_id() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let run = chain(vec![
            Arc::new(RequestIdLayer::default()) as Arc<dyn Middleware>,
            Arc::new(AccessLog::new()),
        ]);
        let req = health_request().with_header(X_REQUEST_ID, HeaderValue::from_static("abc"));
        let res = run(req).await;
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);

        let out = capture.contents();
        assert_eq!(out.lines().count(), 1, "expected one access line, got: {out}");
        for needle in ["HTTP/1.1 abc GET /health 127.0.0.1:53412 probe/1.0", "status=204"] {
            assert!(out.contains(needle), "missing {needle:?} in {out}");
        }
    }

    #[tokio::test]
    async fn logs_unknown_when_tracer_is_absent() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let run = chain(vec![Arc::new(AccessLog::new()) as Arc<dyn Middleware>]);
        run(health_request()).await;

        assert!(capture.contents().contains("HTTP/1.1 unknown GET /health"));
    }

    #[tokio::test]
    async fn logs_once_when_the_request_is_cancelled() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let stack: Arc<[Arc<dyn Middleware>]> = Arc::from(vec![
            Arc::new(RequestIdLayer::default()) as Arc<dyn Middleware>,
            Arc::new(AccessLog::new()),
        ]);
        let stalled = (|_req: Request| std::future::pending::<Response>()).into_boxed_handler();
        let req = health_request().with_header(X_REQUEST_ID, HeaderValue::from_static("stall1"));
        let fut = Next::new(stack, stalled).run(req);

        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), fut).await;
        assert!(timed_out.is_err());

        let out = capture.contents();
        assert_eq!(out.lines().count(), 1, "expected one access line, got: {out}");
        for needle in ["HTTP/1.1 stall1 GET /health", "status=-"] {
            assert!(out.contains(needle), "missing {needle:?} in {out}");
        }
    }
}
