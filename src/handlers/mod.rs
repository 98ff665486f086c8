pub mod admin;
pub mod links;
pub mod pages;
pub mod status;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Redirect with an explicit status; axum's `Redirect` only offers 303/307/308.
pub(crate) fn redirect_with(status: StatusCode, location: &str) -> Response {
    (status, [(header::LOCATION, location.to_owned())]).into_response()
}
