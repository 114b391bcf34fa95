// ==========================================
// Precast tracking backend - HTTP server
// ==========================================
// Routes:
//   POST /import/element_type/:project_id      upload, returns job handle
//   GET  /import/jobs/:job_id                  job status
//   POST /import/jobs/:job_id/cancel           cooperative cancel
//   GET  /export/template/element_type/:project_id
// Every route requires a session token.
// ==========================================

pub mod auth;
pub mod error;
pub mod handlers;

use crate::api::ImportApi;
use crate::services::SessionValidator;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Upload size accepted by the import route.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<ImportApi>,
    pub sessions: Arc<dyn SessionValidator>,
}

impl AppState {
    pub fn new(api: Arc<ImportApi>, sessions: Arc<dyn SessionValidator>) -> Self {
        Self { api, sessions }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/import/element_type/:project_id",
            post(handlers::submit_import).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/import/jobs/:job_id", get(handlers::job_status))
        .route("/import/jobs/:job_id/cancel", post(handlers::cancel_job))
        .route(
            "/export/template/element_type/:project_id",
            get(handlers::export_template),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
