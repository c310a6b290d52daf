//! HTTP work payload: the server the service hosts.
//!
//! Routes:
//! - `GET /` returns `Hello World`
//! - `/static/*` serves files from the configured static directory
//! - anything else returns 404 `Not Found`

use std::path::Path;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::service::config::HttpConfig;
use crate::{Result, WebSvcError};

/// Build the router serving `static_dir` under `/static/`.
pub fn router(static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(hello))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(not_found)
}

/// Bind the listener and serve until the process exits.
pub async fn serve(config: HttpConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await.map_err(|e| {
        WebSvcError::Service(format!("Failed to bind {}: {}", config.listen_addr, e))
    })?;

    tracing::info!("HTTP server listening on {}", config.listen_addr);

    axum::serve(listener, router(&config.static_dir))
        .await
        .map_err(WebSvcError::Io)
}

async fn hello() -> &'static str {
    "Hello World"
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
