//! # waypost
//!
//! A small versioned HTTP API skeleton on hyper.
//!
//! - Versioned routing: route groups mounted under prefixes like `/api/v0`,
//!   compiled into [`matchit`] radix trees at startup. Conflicts fail the
//!   build, not a request.
//! - Request tracing: every request carries an `X-Request-Id`, taken from
//!   the caller or generated, and echoed on the response.
//! - Access logging: one `tracing` event per completed request.
//! - Health: `GET /health` answers `204` while serving and `503` otherwise.
//! - Graceful shutdown: SIGTERM / Ctrl-C flips health Down, stops
//!   accepting, and drains in-flight requests within a 30 s deadline.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use waypost::{Request, Response, Route, Router, Server, ServerConfig, shutdown_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost::Error> {
//!     let router = Router::new().version("/api/v1", vec![
//!         Route::get("/users/{id}", get_user),
//!     ]);
//!
//!     Server::new(ServerConfig::from_env()?, router)
//!         .run(shutdown_signal())
//!         .await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::message(StatusCode::OK, &format!("user {id}"))
//! }
//! ```

mod error;
mod handler;
mod health;
mod method;
mod request;
mod response;
mod router;

pub mod api;
pub mod config;
pub mod middleware;
pub mod server;
pub mod telemetry;

pub use config::{ListenerFailure, ServerConfig};
pub use error::Error;
pub use handler::Handler;
pub use health::{Health, HealthState};
pub use method::{Method, UnknownMethod};
pub use request::{Request, RequestId};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{Dispatcher, HEALTH_PATH, Route, Router};
pub use server::{Phase, Running, Server, shutdown_signal};
