//! # API Module
//!
//! HTTP surface of SCMS:
//! - `GET /` - redirect to the default page
//! - `GET /<path>` - a stored file with that name, else a compiled page
//! - `/editor/...` - content editor (see [`editor`]), signed-in users only
//! - `GET /login`, `GET /logout` - hand-off to the authenticator

use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::core::error::{Error, Result};

pub mod auth;
pub mod editor;
pub mod form;
pub mod registry;
pub mod server;
pub mod site;

pub use registry::{BuildReport, PageRegistry};
pub use server::{create_app, start_server};

/// 302 Found to `location`
pub fn found(location: &str) -> impl IntoResponse {
    (StatusCode::FOUND, [(LOCATION, location.to_string())])
}

/// Plain 404
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}

/// Run store and template work off the async runtime
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("blocking task failed: {e}")))?
}
