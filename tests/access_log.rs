//! The access log as seen through a real connection.
//!
//! Runs on a current-thread runtime so the scoped subscriber also sees the
//! events emitted by connection tasks.

mod common;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use waypost::{Request, Route, Router};
use waypost::middleware::access_log::TARGET;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn access_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .filter(|line| line.contains(TARGET))
            .map(str::to_owned)
            .collect()
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

fn capture() -> (Capture, DefaultGuard) {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_target(true)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

#[tokio::test(flavor = "current_thread")]
async fn health_request_is_logged_with_caller_address() {
    let (capture, _guard) = capture();

    let server = common::spawn(Router::new()).await;
    let (caller, reply) = common::raw_exchange(
        server.addr,
        "GET /health HTTP/1.1\r\nHost: localhost\r\nX-Request-Id: abc\r\nUser-Agent: probe/1.0\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 204"), "unexpected reply: {reply}");
    server.stop().await.unwrap();

    let lines = capture.access_lines();
    assert_eq!(lines.len(), 1, "expected one access line, got: {lines:?}");
    let line = &lines[0];
    let caller = caller.to_string();
    for needle in ["HTTP/1.1 abc GET /health", caller.as_str(), "probe/1.0", "status=204"] {
        assert!(line.contains(needle), "missing {needle:?} in {line}");
    }
}

#[tokio::test(flavor = "current_thread")]
async fn write_timeout_still_logs_the_request() {
    let (capture, _guard) = capture();

    let router = Router::new().version(
        "/test",
        vec![Route::get("/stall", |_req: Request| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "late"
        })],
    );
    let config = common::config().with_write_timeout(Duration::from_millis(100));
    let server = common::spawn_with(config, router).await;

    let (caller, reply) = common::raw_exchange(
        server.addr,
        "GET /test/stall HTTP/1.1\r\nHost: localhost\r\nX-Request-Id: stall1\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(reply.is_empty(), "expected no response, got: {reply}");
    server.stop().await.unwrap();

    let lines = capture.access_lines();
    assert_eq!(lines.len(), 1, "expected one access line, got: {lines:?}");
    let line = &lines[0];
    let caller = caller.to_string();
    for needle in ["HTTP/1.1 stall1 GET /test/stall", caller.as_str(), "status=-"] {
        assert!(line.contains(needle), "missing {needle:?} in {line}");
    }
}
