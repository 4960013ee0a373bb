//! HTTP server for SCMS

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::{auth, editor, site};
use crate::core::error::Result;
use crate::core::AppState;

/// Creates the application router with all routes and middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.limits.max_request_bytes;

    Router::new()
        // Editor, behind authentication
        .merge(editor::routes(state.clone()))
        // Sign-in hand-off
        .route("/login", get(auth::login))
        .route("/logout", get(auth::logout))
        // Files and compiled pages
        .fallback(site::serve)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn start_server(
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = state.config.server.http_addr;
    tracing::info!("Starting SCMS server on {}", addr);

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Editor available at http://{}/editor", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
