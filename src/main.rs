// ==========================================
// Precast tracking backend - server entry point
// ==========================================
// Startup:
//   config → database → owned tables → interrupted jobs failed
//   → activity log worker → job controller → HTTP server
// Shutdown (Ctrl-C): stop accepting requests, cancel live jobs,
// drain the activity log queue.
// ==========================================

use anyhow::Context;
use precast_import::api::ImportApi;
use precast_import::config::{ImportConfig, ServerConfig};
use precast_import::db::{open_sqlite_connection, ConnectionPool};
use precast_import::jobs::JobController;
use precast_import::repository::{ActivityLogRepository, ImportJobRepository};
use precast_import::server::{self, AppState};
use precast_import::services::{ActivityLogger, LocalFileStorage, SqliteSessionValidator};
use precast_import::{logging, APP_NAME, VERSION};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!(version = VERSION, "{} starting", APP_NAME);
    tracing::info!("==================================================");

    let config = ServerConfig::from_env()?;
    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create database directory {}", parent.display()))?;
    }
    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!("cannot create upload directory {}", config.upload_dir.display())
    })?;
    tracing::info!(db_path = %config.db_path, upload_dir = %config.upload_dir.display(), "using storage");

    // Bookkeeping connection: job records, activity log, sessions
    let conn = open_sqlite_connection(&config.db_path)
        .with_context(|| format!("cannot open database {}", config.db_path))?;
    let import_config = ImportConfig::load(&conn);
    let conn = Arc::new(Mutex::new(conn));

    let jobs = Arc::new(ImportJobRepository::new(conn.clone()));
    jobs.ensure_table()?;
    let interrupted = jobs.fail_interrupted("interrupted by server restart")?;
    if interrupted > 0 {
        tracing::warn!(interrupted, "unfinished jobs from a previous run marked failed");
    }

    let activity_repo = Arc::new(ActivityLogRepository::new(conn.clone()));
    activity_repo.ensure_table()?;

    let pool = ConnectionPool::new(
        &config.db_path,
        import_config.pool_size,
        import_config.pool_acquire_timeout(),
    )
    .context("cannot create connection pool")?;

    let (activity, activity_worker) =
        ActivityLogger::start(activity_repo, import_config.activity_queue_capacity);

    let controller = Arc::new(
        JobController::new(pool.clone(), import_config, jobs).with_activity_logger(activity.clone()),
    );
    let storage = Arc::new(LocalFileStorage::new(config.upload_dir.clone()));
    let api = Arc::new(
        ImportApi::new(controller.clone(), storage, pool.clone()).with_activity_logger(activity),
    );
    let sessions = Arc::new(SqliteSessionValidator::new(conn));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_addr))?;
    server::serve(listener, AppState::new(api, sessions), shutdown_signal()).await?;

    tracing::info!("http server stopped, finishing jobs");
    let cancelled = controller.shutdown(JOB_SHUTDOWN_TIMEOUT).await;
    pool.close();
    let written = activity_worker.shutdown().await;
    tracing::info!(cancelled, activity_logs = written, "shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        // without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
