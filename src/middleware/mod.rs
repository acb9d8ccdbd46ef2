//! Middleware layer.
//!
//! A middleware intercepts a request, may inspect or annotate it, calls
//! [`Next::run`] to hand it to the rest of the chain, and may inspect or
//! annotate the response on the way out. The chain is an ordered list:
//! the first middleware registered is the outermost.
//!
//! ```text
//! request ─▶ RequestIdLayer ─▶ AccessLog ─▶ user layers ─▶ route handler
//! response ◀──────────────────────────────────────────────────────┘
//! ```
//!
//! The two built-ins are installed by [`Router::build`](crate::Router::build)
//! in that fixed order so every access-log line can see a correlation id.

use std::sync::Arc;

use crate::handler::BoxedHandler;
use crate::request::Request;

pub use crate::handler::BoxFuture;

pub mod access_log;
pub mod request_id;

pub use access_log::AccessLog;
pub use request_id::{IdGenerator, NanoClock, RequestIdLayer, X_REQUEST_ID};

/// A request interceptor.
///
/// ```rust
/// use waypost::middleware::{BoxFuture, Middleware, Next};
/// use waypost::Request;
///
/// struct PoweredBy;
///
/// impl Middleware for PoweredBy {
///     fn call(&self, req: Request, next: Next) -> BoxFuture {
///         Box::pin(async move {
///             let mut res = next.run(req).await;
///             res.set_header(
///                 http::HeaderName::from_static("x-powered-by"),
///                 http::HeaderValue::from_static("waypost"),
///             );
///             res
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of the chain after the current middleware.
pub struct Next {
    stack: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(stack: Arc<[Arc<dyn Middleware>]>, endpoint: BoxedHandler) -> Self {
        Self { stack, index: 0, endpoint }
    }

    /// Passes `req` to the next middleware, or to the route handler once the
    /// chain is exhausted.
    pub fn run(self, req: Request) -> BoxFuture {
        let Some(mw) = self.stack.get(self.index).cloned() else {
            return self.endpoint.call(req);
        };
        let next = Self { index: self.index + 1, ..self };
        mw.call(req, next)
    }
}
