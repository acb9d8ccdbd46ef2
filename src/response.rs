//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! JSON bodies follow one envelope: `{"msg": "..."}` for informational
//! payloads and `{"error": "..."}` for failures.

use std::fmt;

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

#[derive(Serialize)]
struct Message<'a> {
    msg: &'a str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use waypost::Response;
///
/// Response::status(StatusCode::NO_CONTENT);
/// Response::message(StatusCode::NOT_IMPLEMENTED, "Not yet implemented");
/// Response::error(StatusCode::UNAUTHORIZED, "not logged in");
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header(http::header::LOCATION, "/users/42")
///     .text("created");
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Response with no body.
    pub fn status(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Serialises `value` as the JSON body.
    ///
    /// A value serde cannot encode becomes a `500` with an error envelope.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        Self::builder().status(status).json(value)
    }

    /// `{"msg": msg}` with the given status.
    pub fn message(status: StatusCode, msg: &str) -> Self {
        Self::json(status, &Message { msg })
    }

    /// `{"error": err}` with the given status.
    pub fn error(status: StatusCode, err: impl fmt::Display) -> Self {
        let error = err.to_string();
        Self::json(status, &ErrorBody { error: &error })
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { status: StatusCode::OK, headers: HeaderMap::new() }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub(crate) fn into_hyper(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Appends a header. Values that are not valid header text are dropped.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json<T: Serialize>(self, value: &T) -> Response {
        match serde_json::to_vec(value) {
            Ok(body) => self.finish(JSON, body.into()),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialise response body");
                let body = serde_json::json!({ "error": "internal serialisation error" });
                Response {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    headers: content_type(JSON),
                    body: body.to_string().into(),
                }
            }
        }
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT, body.into().into())
    }

    /// Terminate with no body (e.g. `204 No Content`, `301 Moved Permanently`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }

    fn finish(self, ct: &'static str, body: Bytes) -> Response {
        let mut headers = content_type(ct);
        headers.extend(self.headers);
        Response { status: self.status, headers, body }
    }
}

fn content_type(ct: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
    headers
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a bare status from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(res: &Response) -> serde_json::Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[test]
    fn message_envelope() {
        let res = Response::message(StatusCode::NOT_IMPLEMENTED, "Not yet implemented");
        assert_eq!(res.status_code(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(body_json(&res), serde_json::json!({ "msg": "Not yet implemented" }));
    }

    #[test]
    fn error_envelope() {
        let res = Response::error(StatusCode::NOT_IMPLEMENTED, "not logged in");
        assert_eq!(body_json(&res), serde_json::json!({ "error": "not logged in" }));
    }

    #[test]
    fn status_only_has_no_body_or_content_type() {
        let res = Response::status(StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
        assert!(res.header("content-type").is_none());
    }

    #[test]
    fn builder_keeps_extra_headers() {
        let res = Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header(header::LOCATION, "/api/v0/login")
            .no_body();
        assert_eq!(res.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.header("location"), Some("/api/v0/login"));
    }

    #[test]
    fn set_header_replaces() {
        let mut res = Response::text("hi");
        res.set_header(HeaderName::from_static("x-request-id"), HeaderValue::from_static("a"));
        res.set_header(HeaderName::from_static("x-request-id"), HeaderValue::from_static("b"));
        assert_eq!(res.header("x-request-id"), Some("b"));
    }

    #[test]
    fn into_hyper_preserves_parts() {
        let res = Response::message(StatusCode::ACCEPTED, "ok").into_hyper();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
    }
}
