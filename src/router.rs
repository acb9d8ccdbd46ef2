//! Versioned route table and request dispatch.
//!
//! Routes are grouped under version prefixes (`/api/v0`, `/api/v1`, …) and
//! compiled once, at startup, into one radix tree per HTTP method. Lookup is
//! O(path-length). The table is read-only after [`Router::build`].
//!
//! ```rust
//! use waypost::{Health, Method, Request, Route, Router};
//!
//! async fn login(_req: Request) -> &'static str { "hi" }
//!
//! let dispatcher = Router::new()
//!     .version("/api/v0", vec![Route::new("/login", &[Method::Post], login)])
//!     .build(&Health::new())
//!     .expect("valid route table");
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use http::header::{self, HeaderValue};
use http::StatusCode;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::health::Health;
use crate::method::Method;
use crate::middleware::{AccessLog, Middleware, Next, RequestIdLayer};
use crate::request::Request;
use crate::response::Response;

/// Path of the built-in health probe. Always mounted, outside any version.
pub const HEALTH_PATH: &str = "/health";

// ── Route ─────────────────────────────────────────────────────────────────────

/// One endpoint: a path pattern, the methods it answers, and its handler.
///
/// Path parameters use `{name}` segments: `/{user}/friends`.
pub struct Route {
    path: String,
    methods: Vec<Method>,
    handler: BoxedHandler,
}

impl Route {
    pub fn new(path: &str, methods: &[Method], handler: impl Handler) -> Self {
        let mut methods = methods.to_vec();
        methods.sort();
        methods.dedup();
        Self { path: path.to_owned(), methods, handler: handler.into_boxed_handler() }
    }

    pub fn get(path: &str, handler: impl Handler) -> Self {
        Self::new(path, &[Method::Get], handler)
    }

    pub fn post(path: &str, handler: impl Handler) -> Self {
        Self::new(path, &[Method::Post], handler)
    }

    pub fn path(&self) -> &str { &self.path }
    pub fn methods(&self) -> &[Method] { &self.methods }
}

// ── Router (builder) ──────────────────────────────────────────────────────────

/// Builder for the route table and middleware chain.
pub struct Router {
    versions: Vec<(String, Vec<Route>)>,
    request_ids: RequestIdLayer,
    layers: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            versions: Vec::new(),
            request_ids: RequestIdLayer::default(),
            layers: Vec::new(),
        }
    }

    /// Mount `routes` under `prefix`. Each route is reachable at
    /// `prefix + route.path`. A trailing `/` on the prefix is ignored.
    pub fn version(mut self, prefix: &str, routes: Vec<Route>) -> Self {
        let prefix = prefix.trim_end_matches('/').to_owned();
        self.versions.push((prefix, routes));
        self
    }

    /// Replace the correlation-id layer, e.g. to plug in another generator.
    pub fn request_ids(mut self, layer: RequestIdLayer) -> Self {
        self.request_ids = layer;
        self
    }

    /// Append a middleware. User layers run inside the built-in tracer and
    /// access logger, in registration order.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Compile the table into a [`Dispatcher`].
    ///
    /// `GET /health` is bound to `health`. Fails if a prefix is mounted
    /// twice, a route is malformed, or two routes claim the same method and
    /// path.
    pub fn build(self, health: &Health) -> Result<Dispatcher, Error> {
        let mut trees: HashMap<Method, MatchitRouter<BoxedHandler>> = HashMap::new();

        let probe = health.clone();
        let health_route = Route::get(HEALTH_PATH, move |_req: Request| {
            std::future::ready(probe.probe())
        });
        insert(&mut trees, HEALTH_PATH, &health_route)?;

        let mut prefixes = HashSet::new();
        for (prefix, routes) in &self.versions {
            if !prefixes.insert(prefix.as_str()) {
                return Err(Error::DuplicateVersion(prefix.clone()));
            }
            if !prefix.is_empty() && !prefix.starts_with('/') {
                return Err(Error::InvalidRoute {
                    path: prefix.clone(),
                    reason: "version prefix must start with `/`".into(),
                });
            }
            for route in routes {
                let full = format!("{prefix}{}", route.path);
                insert(&mut trees, &full, route)?;
            }
        }

        let mut stack: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(self.request_ids), Arc::new(AccessLog::new())];
        stack.extend(self.layers);

        Ok(Dispatcher {
            trees,
            middleware: Arc::from(stack),
            not_found: not_found(),
        })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn insert(
    trees: &mut HashMap<Method, MatchitRouter<BoxedHandler>>,
    full_path: &str,
    route: &Route,
) -> Result<(), Error> {
    if !route.path.starts_with('/') {
        return Err(Error::InvalidRoute {
            path: full_path.to_owned(),
            reason: "route path must start with `/`".into(),
        });
    }
    if route.methods.is_empty() {
        return Err(Error::InvalidRoute {
            path: full_path.to_owned(),
            reason: "route allows no methods".into(),
        });
    }

    for &method in &route.methods {
        trees
            .entry(method)
            .or_default()
            .insert(full_path, Arc::clone(&route.handler))
            .map_err(|e| match e {
                matchit::InsertError::Conflict { with } => Error::RouteConflict {
                    method,
                    path: full_path.to_owned(),
                    with,
                },
                other => Error::InvalidRoute {
                    path: full_path.to_owned(),
                    reason: other.to_string(),
                },
            })?;
        debug!(%method, path = full_path, "route registered");
    }
    Ok(())
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// The compiled route table plus middleware chain. Cheap to share behind an
/// `Arc`; every connection task holds one.
pub struct Dispatcher {
    trees: HashMap<Method, MatchitRouter<BoxedHandler>>,
    middleware: Arc<[Arc<dyn Middleware>]>,
    not_found: BoxedHandler,
}

impl Dispatcher {
    /// Route one request through the middleware chain to its handler.
    ///
    /// Misses still pass through the middlewares: unknown paths get `404`,
    /// known paths with the wrong method get `405` plus `Allow`, and a path
    /// that only differs from a route by a trailing slash gets a `301` to the
    /// registered form.
    pub fn dispatch(&self, mut req: Request) -> BoxFuture {
        let endpoint = self.resolve(&mut req);
        Next::new(Arc::clone(&self.middleware), endpoint).run(req)
    }

    /// Answer `req` with a fixed error envelope, still through the
    /// middleware chain. For requests refused before routing, e.g. an
    /// oversized body.
    pub(crate) fn reject(&self, req: Request, status: StatusCode, reason: &'static str) -> BoxFuture {
        let endpoint = (move |_req: Request| async move { Response::error(status, reason) })
            .into_boxed_handler();
        Next::new(Arc::clone(&self.middleware), endpoint).run(req)
    }

    fn resolve(&self, req: &mut Request) -> BoxedHandler {
        if let Some((handler, params)) = self.lookup(req.method(), req.path()) {
            req.set_params(params);
            return handler;
        }

        let allowed = self.allowed_methods(req.path());
        if !allowed.is_empty() {
            return method_not_allowed(&allowed);
        }

        if let Some(location) = self.slash_redirect(req) {
            return moved_permanently(location);
        }

        Arc::clone(&self.not_found)
    }

    fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.trees.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Methods that do have a route for `path`, sorted.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut allowed: Vec<Method> = self.trees.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| *method)
            .collect();
        allowed.sort();
        allowed
    }

    fn slash_redirect(&self, req: &Request) -> Option<String> {
        let path = req.path();
        let toggled = if path.len() > 1 && path.ends_with('/') {
            path.trim_end_matches('/').to_owned()
        } else if !path.ends_with('/') {
            format!("{path}/")
        } else {
            return None;
        };
        if toggled.is_empty() {
            return None;
        }

        self.lookup(req.method(), &toggled)?;
        Some(match req.query() {
            Some(q) => format!("{toggled}?{q}"),
            None => toggled,
        })
    }
}

fn not_found() -> BoxedHandler {
    (|_req: Request| async { Response::error(StatusCode::NOT_FOUND, "not found") })
        .into_boxed_handler()
}

fn method_not_allowed(allowed: &[Method]) -> BoxedHandler {
    let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
    (move |_req: Request| {
        let allow = allow.clone();
        async move {
            let mut res = Response::error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                res.set_header(header::ALLOW, value);
            }
            res
        }
    })
    .into_boxed_handler()
}

fn moved_permanently(location: String) -> BoxedHandler {
    (move |_req: Request| {
        let location = location.clone();
        async move {
            Response::builder()
                .status(StatusCode::MOVED_PERMANENTLY)
                .header(header::LOCATION, &location)
                .no_body()
        }
    })
    .into_boxed_handler()
}
