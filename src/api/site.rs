//! Public site: default-page redirect, raw files and compiled pages

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::{blocking, found, not_found};
use crate::content::editing::default_page;
use crate::content::records::{load, File};
use crate::core::error::Error;
use crate::core::AppState;
use crate::query::RequestParams;
use crate::template::TemplateContext;

/// Content type for a file name, by extension
pub fn guess_content_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

fn internal_error(err: Error) -> Response {
    if err.is_server_error() {
        error!("Site request failed: {}", err);
    } else {
        warn!("Site request rejected: {}", err);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Fallback handler for every path outside the editor
pub async fn serve(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return not_found();
    }

    if uri.path() == "/" {
        let store = state.store.clone();
        return match blocking(move || default_page(store.as_ref())).await {
            Ok(name) => {
                debug!("{:?} is the default page", name);
                found(&format!("/{name}")).into_response()
            }
            Err(Error::NoDefaultPage) => {
                error!("Root requested but no default page is specified");
                (StatusCode::INTERNAL_SERVER_ERROR, Error::NoDefaultPage.to_string()).into_response()
            }
            Err(e) => internal_error(e),
        };
    }

    let path = uri.path().trim_start_matches('/');
    let file_name = urlencoding::decode(path)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| path.to_string());
    let store = state.store.clone();
    match blocking(move || load::<File>(store.as_ref(), &File::key(&file_name))).await {
        Ok(file) => {
            return ([(CONTENT_TYPE, guess_content_type(&file.name))], file.data).into_response();
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return internal_error(e),
    }

    let page = {
        let state = state.clone();
        let path = uri.path().to_string();
        blocking(move || {
            state.registry.ensure_built(state.store.as_ref())?;
            Ok(state.registry.lookup(&path))
        })
        .await
    };
    let page = match page {
        Ok(page) => page,
        Err(e) => return internal_error(e),
    };
    let Some(page) = page else {
        if state.registry.is_empty() {
            info!("No pages are mounted, redirecting to the editor");
            return found("/editor").into_response();
        }
        return not_found();
    };

    let params = RequestParams::parse(uri.query().unwrap_or_default());
    let ctx = TemplateContext::new(state.engine(), params);
    match blocking(move || page.render(ctx)).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("style.CSS"), "text/css; charset=utf-8");
        assert_eq!(guess_content_type("img/logo.png"), "image/png");
        assert_eq!(guess_content_type("README"), "application/octet-stream");
        assert_eq!(guess_content_type("archive.tar.gz"), "application/octet-stream");
    }
}
