//! Accept loop for the HTTP API
//!
//! `axum::serve` exposes no connection settings, so connections are driven with
//! hyper directly. Each one gets a header read timeout and, once shutdown starts,
//! finishes its current request before closing.

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pause after a failed accept, e.g. when file descriptors run out
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serves `router` until `shutdown` is cancelled and every open connection is done
///
/// # Arguments
///
/// * `listener` - Bound listener; dropped as soon as shutdown starts
/// * `router` - The API router
/// * `shutdown` - Stops accepting and closes connections gracefully
/// * `read_header_timeout` - Time a client gets to send complete request headers
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    read_header_timeout: Duration,
) {
    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(read_header_timeout);

    let connections = TaskTracker::new();

    loop {
        let (stream, remote) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let builder = builder.clone();
        let service = TowerToHyperService::new(router.clone());
        let shutdown = shutdown.clone();

        connections.spawn(async move {
            let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let mut closing = false;
            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            tracing::debug!(remote = %remote, error = %e, "Connection ended with error");
                        }
                        break;
                    }
                    _ = shutdown.cancelled(), if !closing => {
                        closing = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
        });
    }

    drop(listener);
    connections.close();
    if !connections.is_empty() {
        tracing::debug!(open = connections.len(), "Waiting for open connections");
    }
    connections.wait().await;
}
