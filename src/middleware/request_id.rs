//! Correlation-id middleware.
//!
//! Reads `X-Request-Id` from the request; when it is missing, empty or not
//! valid header text a fresh id is generated. The id is stored on the
//! [`Request`] for downstream code and echoed on the response.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use http::{HeaderName, HeaderValue};

use super::{BoxFuture, Middleware, Next};
use crate::request::{Request, RequestId};

/// Header used for correlation ids on both requests and responses.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Source of fresh correlation ids.
///
/// Implemented for any `Fn() -> String`, so a UUID or snowflake generator
/// can be dropped in as a closure.
pub trait IdGenerator: Send + Sync + 'static {
    fn next_id(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn next_id(&self) -> String {
        self()
    }
}

/// Wall-clock nanoseconds since the Unix epoch, forced strictly increasing.
///
/// Two calls never return the same value within a process, even when the
/// clock reads identically or steps backwards.
#[derive(Debug, Default)]
pub struct NanoClock {
    last: AtomicU64,
}

impl NanoClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for NanoClock {
    fn next_id(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        // The closure always returns Some, so fetch_update cannot fail.
        let prev = match self.last.fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last.wrapping_add(1)))
        }) {
            Ok(prev) | Err(prev) => prev,
        };
        now.max(prev.wrapping_add(1)).to_string()
    }
}

/// Assigns or propagates the correlation id.
#[derive(Clone)]
pub struct RequestIdLayer {
    generator: Arc<dyn IdGenerator>,
}

impl RequestIdLayer {
    pub fn new(generator: impl IdGenerator) -> Self {
        Self { generator: Arc::new(generator) }
    }
}

impl Default for RequestIdLayer {
    fn default() -> Self {
        Self::new(NanoClock::new())
    }
}

impl Middleware for RequestIdLayer {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        let id = match req.header(X_REQUEST_ID.as_str()) {
            Some(given) if !given.is_empty() => given.to_owned(),
            _ => self.generator.next_id(),
        };
        req.set_request_id(RequestId::new(id.clone()));

        Box::pin(async move {
            let mut res = next.run(req).await;
            match HeaderValue::from_str(&id) {
                Ok(value) => res.set_header(X_REQUEST_ID, value),
                Err(_) => tracing::debug!(request_id = %id, "request id is not a valid header value"),
            }
            res
        })
    }
}
