//! v0: account endpoints. None of them are implemented yet; each answers
//! `501 Not Implemented` with a fixed JSON envelope and touches nothing.

use http::StatusCode;
use tracing::debug;

use crate::request::Request;
use crate::response::Response;
use crate::router::Route;

pub fn routes() -> Vec<Route> {
    vec![
        Route::post("/register", register),
        Route::post("/login", login),
        Route::get("/{user}/friends", friends),
    ]
}

pub async fn register(_req: Request) -> Response {
    Response::message(StatusCode::NOT_IMPLEMENTED, "Not yet implemented")
}

pub async fn login(_req: Request) -> Response {
    Response::error(StatusCode::NOT_IMPLEMENTED, "not logged in")
}

pub async fn friends(req: Request) -> Response {
    let user = req.param("user").unwrap_or_default();
    debug!(user, "friends list requested");
    Response::message(
        StatusCode::NOT_IMPLEMENTED,
        &format!("You will have to wait a lil bit {user}!"),
    )
}
