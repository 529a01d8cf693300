//! ims-server: the RPC and HTTP surfaces of the image store.
//!
//! This crate wires the content and metadata stores into an [`ImageHandler`]
//! and serves it on two listeners:
//!
//! - an RPC surface exposing `CreateImage`, `GetImage`, `DeleteImage` and
//!   `ListImages` as JSON over HTTP
//! - a read-only HTTP surface serving image bytes at `/images/{id}`
//!
//! Both surfaces stop together on SIGINT/SIGTERM or when the cancellation
//! token fires, draining in-flight requests first.

pub mod error;
pub mod handler;
pub mod middleware;
pub mod reconcile;
pub mod router;
pub mod routes;
pub mod rpc;

use std::sync::Arc;
use std::time::Duration;

use ims_core::config::Config;
use ims_db::SqliteMetadataStore;
use ims_storage::FsContentStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use crate::handler::ImageHandler;

/// Build an [`ImageHandler`] backed by the filesystem and SQLite, creating
/// the storage directories if needed.
pub fn open_handler(config: &Config) -> ims_core::Result<ImageHandler> {
    let storage = &config.storage;

    if !storage.images_dir.exists() {
        std::fs::create_dir_all(&storage.images_dir).map_err(ims_core::Error::content)?;
        tracing::info!("Created images directory {}", storage.images_dir.display());
    }

    let db_path = &storage.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(ims_core::Error::metadata)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy();
    let pool = ims_db::pool::init_pool(&db_str, storage.pool_size)?;
    if existed {
        tracing::info!("Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }

    let handler = ImageHandler::new(
        Arc::new(FsContentStore::new(&storage.images_dir)),
        Arc::new(SqliteMetadataStore::new(pool)),
        &config.server.base_url,
    )
    .with_max_image_bytes(storage.max_image_bytes);
    Ok(handler)
}

/// Start the image store.
///
/// Opens both stores, binds the RPC and HTTP listeners, and serves until a
/// shutdown signal is received.
pub async fn start(config: Config) -> ims_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let handler = open_handler(&config)?;
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);

    let rpc_addr = config.server.rpc_addr();
    let rpc_listener = TcpListener::bind(&rpc_addr).await.map_err(|e| {
        ims_core::Error::Internal(format!("Failed to bind RPC listener to {rpc_addr}: {e}"))
    })?;
    let http_addr = config.server.http_addr();
    let http_listener = TcpListener::bind(&http_addr).await.map_err(|e| {
        ims_core::Error::Internal(format!("Failed to bind HTTP listener to {http_addr}: {e}"))
    })?;

    tracing::info!("RPC server listening on {rpc_addr}");
    tracing::info!(
        "HTTP server listening on {http_addr} (base URL {})",
        config.server.base_url
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_cancel.clone()).await;
        signal_cancel.cancel();
    });

    serve(handler, rpc_listener, http_listener, cancel, request_timeout).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve both surfaces on already-bound listeners until `cancel` fires.
///
/// If either surface fails, the other is cancelled too. In-flight requests are
/// allowed to finish before this returns.
pub async fn serve(
    handler: ImageHandler,
    rpc_listener: TcpListener,
    http_listener: TcpListener,
    cancel: CancellationToken,
    request_timeout: Duration,
) -> ims_core::Result<()> {
    let rpc_app = router::build_rpc_router(handler.clone(), request_timeout);
    let http_app = router::build_http_router(handler, request_timeout);

    let rpc_task = tokio::spawn(run_surface("rpc", rpc_listener, rpc_app, cancel.clone()));
    let http_task = tokio::spawn(run_surface("http", http_listener, http_app, cancel.clone()));

    let (rpc_result, http_result) = tokio::join!(rpc_task, http_task);
    for result in [rpc_result, http_result] {
        result.map_err(|e| ims_core::Error::Internal(format!("server task failed: {e}")))??;
    }
    Ok(())
}

async fn run_surface(
    name: &'static str,
    listener: TcpListener,
    app: axum::Router,
    cancel: CancellationToken,
) -> ims_core::Result<()> {
    let token = cancel.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await;

    if let Err(e) = result {
        tracing::error!("{name} server failed: {e}");
        cancel.cancel();
        return Err(ims_core::Error::Internal(format!("{name} server failed: {e}")));
    }
    tracing::debug!("{name} server stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
