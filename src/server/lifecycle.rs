//! Process lifecycle: serve until a signal arrives, then shut down in order
//!
//! Shutdown proceeds in three steps:
//! 1. the shared token is cancelled (by a signal or by the server failing),
//!    which stops the listener and tells every crawl run to drain;
//! 2. the listener closes and in-flight HTTP requests get `grace` to finish;
//! 3. tracked crawl runs get another `grace` to finish draining.
//!
//! Every failure along the way is collected; none of them stops the later steps.

use crate::server::serve::serve;
use axum::Router;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Header read timeout used unless configured otherwise
pub const DEFAULT_READ_HEADER_TIMEOUT: Duration = Duration::from_millis(3000);

/// Everything that went wrong while serving or shutting down
#[derive(Debug, Error)]
#[error("{}", .errors.join(" | "))]
pub struct LifecycleError {
    pub errors: Vec<String>,
}

/// Owns the shutdown token and the tracker of background crawl runs
#[derive(Debug, Clone)]
pub struct Lifecycle {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    grace: Duration,
    read_header_timeout: Duration,
}

impl Lifecycle {
    pub fn new(grace: Duration) -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            grace,
            read_header_timeout: DEFAULT_READ_HEADER_TIMEOUT,
        }
    }

    /// Closes connections whose request headers take longer than `timeout`
    pub fn with_read_header_timeout(mut self, timeout: Duration) -> Self {
        self.read_header_timeout = timeout;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Cancels the shutdown token on SIGINT or SIGTERM
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_signal() => token.cancel(),
                _ = token.cancelled() => {}
            }
        })
    }

    /// Serves `router` on `listener` until shutdown, then drains crawl runs
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Clean shutdown
    /// * `Err(LifecycleError)` - Every error seen while serving or draining
    pub async fn run(self, listener: TcpListener, router: Router) -> Result<(), LifecycleError> {
        let mut errors = Vec::new();

        let mut server = tokio::spawn(serve(
            listener,
            router,
            self.shutdown.clone(),
            self.read_header_timeout,
        ));

        let server_exited = tokio::select! {
            _ = self.shutdown.cancelled() => false,
            result = &mut server => {
                if let Some(error) = server_error(result) {
                    errors.push(error);
                }
                tracing::warn!("HTTP server stopped before shutdown was requested");
                self.shutdown.cancel();
                true
            }
        };

        tracing::info!(grace_secs = self.grace.as_secs(), "Shutting down");

        if !server_exited {
            match timeout(self.grace, &mut server).await {
                Ok(result) => {
                    if let Some(error) = server_error(result) {
                        errors.push(error);
                    }
                }
                Err(_) => {
                    server.abort();
                    errors.push(format!(
                        "in-flight requests did not finish within {}s",
                        self.grace.as_secs()
                    ));
                }
            }
        }

        self.tracker.close();
        if !self.tracker.is_empty() {
            tracing::info!(active = self.tracker.len(), "Waiting for crawl runs to drain");
        }
        if timeout(self.grace, self.tracker.wait()).await.is_err() {
            errors.push(format!(
                "{} crawl runs did not finish within {}s",
                self.tracker.len(),
                self.grace.as_secs()
            ));
        }

        if errors.is_empty() {
            tracing::info!("Shutdown complete");
            Ok(())
        } else {
            for error in &errors {
                tracing::error!("{}", error);
            }
            Err(LifecycleError { errors })
        }
    }
}

fn server_error(result: Result<(), tokio::task::JoinError>) -> Option<String> {
    result
        .err()
        .map(|e| format!("HTTP server task failed: {}", e))
}

/// Resolves on the first SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    async fn bind() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_clean_shutdown() {
        let lifecycle = Lifecycle::new(Duration::from_secs(2));
        let token = lifecycle.shutdown_token();
        let listener = bind().await;
        let addr = listener.local_addr().unwrap();

        let router = Router::new().route("/", get(|| async { "up" }));
        let run = tokio::spawn(lifecycle.run(listener, router));

        let body = reqwest::get(format!("http://{}/", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "up");

        token.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_slow_request_headers_are_cut_off() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let lifecycle = Lifecycle::new(Duration::from_secs(2))
            .with_read_header_timeout(Duration::from_millis(200));
        let token = lifecycle.shutdown_token();
        let listener = bind().await;
        let addr = listener.local_addr().unwrap();

        let router = Router::new().route("/", get(|| async { "up" }));
        let run = tokio::spawn(lifecycle.run(listener, router));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: loc").await.unwrap();

        // The server closes the connection without ever seeing the end of the headers
        let mut received = Vec::new();
        let closed =
            tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut received)).await;
        assert!(closed.is_ok(), "connection was still open after 2s");
        assert!(!String::from_utf8_lossy(&received).contains("up"));

        token.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_waits_for_tracked_runs() {
        let lifecycle = Lifecycle::new(Duration::from_secs(2));
        let token = lifecycle.shutdown_token();
        let tracker = lifecycle.tracker();

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let run_token = token.child_token();
        tracker.spawn(async move {
            run_token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = done_tx.send(());
        });

        let run = tokio::spawn(lifecycle.run(bind().await, Router::new()));
        token.cancel();

        assert!(run.await.unwrap().is_ok());
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_stuck_run_is_reported() {
        let lifecycle = Lifecycle::new(Duration::from_millis(100));
        let token = lifecycle.shutdown_token();
        lifecycle.tracker().spawn(std::future::pending::<()>());

        let run = tokio::spawn(lifecycle.run(bind().await, Router::new()));
        token.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert!(err.to_string().contains("1 crawl runs did not finish"));
    }

    #[test]
    fn test_errors_are_joined() {
        let err = LifecycleError {
            errors: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(err.to_string(), "first | second");
    }
}
