//! Handler trait and type erasure.
//!
//! The route table holds handlers of *different* concrete types in one
//! `HashMap<Method, Tree>`, so each is erased behind `dyn ErasedHandler`:
//!
//! ```text
//! async fn login(req: Request) -> Response { … }   ← user writes this
//!        ↓ Route::post("/login", login)
//! login.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(login))                       ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time               ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
///
/// Also the return type of [`Middleware::call`](crate::middleware::Middleware::call).
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// Satisfied automatically by any `async fn` or closure of the shape
/// `Fn(Request) -> impl Future<Output = impl IntoResponse>`. Sealed: only the
/// blanket impl below can implement it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::method::Method;

    async fn teapot(_req: Request) -> StatusCode {
        StatusCode::IM_A_TEAPOT
    }

    #[tokio::test]
    async fn async_fn_becomes_boxed_handler() {
        let handler = teapot.into_boxed_handler();
        let req = Request::new(Method::Get, "/", "127.0.0.1:1".parse().unwrap());
        let res = handler.call(req).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn closures_capture_state() {
        let greeting = String::from("hello");
        let handler = (move |_req: Request| {
            let body = greeting.clone();
            async move { body }
        })
        .into_boxed_handler();
        let req = Request::new(Method::Get, "/", "127.0.0.1:1".parse().unwrap());
        assert_eq!(handler.call(req).await.body(), b"hello");
    }
}
