use crate::crawler::orchestrator::{CrawlReport, CrawlSettings, Orchestrator};
use crate::request::{CrawlRequest, RequestError};
use crate::sink::Sinks;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Starts crawl runs in the background
///
/// Every run gets a child of the process shutdown token and is tracked so the
/// lifecycle coordinator can wait for in-flight runs on shutdown.
#[derive(Debug, Clone)]
pub struct CrawlLauncher {
    client: Client,
    settings: CrawlSettings,
    sinks: Sinks,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl CrawlLauncher {
    pub fn new(
        client: Client,
        settings: CrawlSettings,
        sinks: Sinks,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            settings,
            sinks,
            tracker,
            shutdown,
        }
    }

    /// Starts a crawl run without waiting for it
    ///
    /// # Returns
    ///
    /// * `Ok(JoinHandle)` - The run was started; the handle yields its report
    /// * `Err(RequestError)` - The request's backend has no configured sink
    pub fn launch(&self, request: CrawlRequest) -> Result<JoinHandle<CrawlReport>, RequestError> {
        let sink = self.sinks.get(request.backend)?;

        let orchestrator = Orchestrator::new(
            request,
            self.client.clone(),
            sink,
            self.settings,
            self.shutdown.child_token(),
        );
        let span = orchestrator.span();

        tracing::debug!(run = orchestrator.run_id(), "Launching crawl run");
        Ok(self.tracker.spawn(orchestrator.run().instrument(span)))
    }

    /// Number of crawl runs still in progress
    pub fn active_crawls(&self) -> usize {
        self.tracker.len()
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
