//! Crawl orchestrator - drives one crawl run
//!
//! The orchestrator owns the frontier and the run's visited set. It keeps at most
//! `max-concurrent-fetches` worker tasks in a `JoinSet`, feeds them from the
//! frontier as they finish, and stops once the frontier is empty and nothing is
//! in flight. Cancellation stops spawning and gives in-flight pages
//! `drain-timeout` to finish before they are aborted.
//!
//! Workers hand back built documents. They are buffered per run and sent with
//! [`IndexSink::index_batch`] once `index-batch-size` are pending, and once more
//! when the run ends so nothing built is left behind.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::FetchSettings;
use crate::crawler::frontier::Frontier;
use crate::crawler::pipeline::{process_page, PageOutcome, RunContext};
use crate::crawler::visited::VisitedSet;
use crate::document::Document;
use crate::request::{Backend, CrawlRequest};
use crate::sink::{IndexError, IndexResult, IndexSink};
use crate::url::{canonicalize, CanonicalPolicy, FilterPolicy};
use crate::CrawlerError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

/// Lifecycle of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Seed marked visited and queued
    Seeded,
    /// Pages are being spawned from the frontier
    Running,
    /// Nothing left to spawn; waiting for in-flight pages
    Draining,
    /// Terminal
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Seeded => "seeded",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
        };
        write!(f, "{}", s)
    }
}

/// Crawl limits derived from the `[crawler]` section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSettings {
    pub fetch: FetchSettings,
    pub max_concurrent_fetches: usize,
    /// 0 means unlimited
    pub max_pages: usize,
    /// Documents buffered before a batch goes to the sink
    pub index_batch_size: usize,
    pub drain_timeout: Duration,
    pub canonical: CanonicalPolicy,
}

impl CrawlSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            fetch: FetchSettings::from_config(config),
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            max_pages: config.max_pages,
            index_batch_size: config.index_batch_size.max(1),
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
            canonical: CanonicalPolicy {
                strip_trailing_slash: config.strip_trailing_slash,
                sort_query: config.sort_query,
            },
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// Summary of a finished crawl run
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub run_id: String,
    pub seed: String,
    pub backend: Backend,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    pub pages_attempted: usize,
    pub pages_indexed: usize,
    pub fetch_failures: usize,
    pub index_failures: usize,
    /// Extraction and serialization failures
    pub other_failures: usize,
    /// Pages indexed from partially extracted markup
    pub pages_truncated: usize,
    pub links_discovered: usize,
    pub links_rejected: usize,
    /// Frontier entries dropped because of `max-pages` or cancellation
    pub pages_dropped: usize,
    pub cancelled: bool,
}

impl CrawlReport {
    fn new(run_id: &str, request: &CrawlRequest) -> Self {
        Self {
            run_id: run_id.to_string(),
            seed: request.seed.to_string(),
            backend: request.backend,
            target: request.target.clone(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            pages_attempted: 0,
            pages_indexed: 0,
            fetch_failures: 0,
            index_failures: 0,
            other_failures: 0,
            pages_truncated: 0,
            links_discovered: 0,
            links_rejected: 0,
            pages_dropped: 0,
            cancelled: false,
        }
    }

    /// Pages whose outcome is known
    pub fn pages_finished(&self) -> usize {
        self.pages_indexed + self.fetch_failures + self.index_failures + self.other_failures
    }

    /// Counts a worker outcome; documents are counted when their batch is sent
    fn record(&mut self, outcome: &PageOutcome) {
        self.links_discovered += outcome.discovered.len();
        self.links_rejected += outcome.links_rejected;
        if outcome.truncated {
            self.pages_truncated += 1;
        }

        match &outcome.result {
            Ok(_) => {}
            Err(CrawlerError::Fetch(_)) => self.fetch_failures += 1,
            Err(_) => self.other_failures += 1,
        }
    }

    fn record_index(&mut self, document: &Document, result: &IndexResult) {
        if result.accepted {
            self.pages_indexed += 1;
            tracing::info!(url = %document.uri, doc_id = %result.document_id, "Indexed page");
            return;
        }

        self.index_failures += 1;
        let error = result
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        tracing::warn!(
            url = %document.uri,
            doc_id = %result.document_id,
            error = %error,
            "Indexing failed"
        );
    }

    fn record_panic(&mut self, error: &JoinError) {
        self.other_failures += 1;
        if error.is_panic() {
            tracing::error!(error = %error, "Page worker panicked");
        }
    }
}

/// Drives a single crawl run
pub struct Orchestrator {
    run_id: String,
    request: CrawlRequest,
    ctx: Arc<RunContext>,
    sink: Arc<dyn IndexSink>,
    pending: Vec<Document>,
    settings: CrawlSettings,
    cancel: CancellationToken,
    state: RunState,
}

impl Orchestrator {
    /// Creates an orchestrator with a fresh visited set
    ///
    /// # Arguments
    ///
    /// * `request` - The validated crawl request
    /// * `client` - The shared page-fetching client
    /// * `sink` - Sink selected by the request's backend
    /// * `settings` - Crawl limits
    /// * `cancel` - Cancelled when the run must stop early
    pub fn new(
        request: CrawlRequest,
        client: Client,
        sink: Arc<dyn IndexSink>,
        settings: CrawlSettings,
        cancel: CancellationToken,
    ) -> Self {
        let ctx = RunContext {
            client,
            fetch_settings: settings.fetch,
            backend: request.backend,
            target: request.target.clone(),
            filter_policy: FilterPolicy::new(request.seed_host(), request.on_domain),
            canonical: settings.canonical,
            visited: VisitedSet::new(),
        };

        let run_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

        Self {
            run_id,
            request,
            ctx: Arc::new(ctx),
            sink,
            pending: Vec::new(),
            settings,
            cancel,
            state: RunState::Seeded,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Span every log line of this run is recorded in
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "crawl",
            run = %self.run_id,
            seed = %self.request.seed,
            backend = %self.request.backend,
        )
    }

    /// Buffers a worker's outcome, sending a batch once enough documents are pending
    async fn accept(&mut self, outcome: PageOutcome, report: &mut CrawlReport) -> Vec<Url> {
        report.record(&outcome);
        if let Ok(document) = outcome.result {
            self.pending.push(document);
            if self.pending.len() >= self.settings.index_batch_size {
                self.flush(report).await;
            }
        }
        outcome.discovered
    }

    /// Sends every pending document in one batch
    async fn flush(&mut self, report: &mut CrawlReport) {
        if self.pending.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.pending);
        tracing::debug!(documents = batch.len(), "Sending document batch");
        let mut results = self.sink.index_batch(&batch).await.into_iter();

        for document in &batch {
            let result = results.next().unwrap_or_else(|| {
                IndexResult::rejected(
                    &document.id,
                    IndexError::transport("sink returned no result for this document"),
                )
            });
            report.record_index(document, &result);
        }
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Crawl state changed");
            self.state = next;
        }
    }

    /// Runs the crawl to completion or cancellation
    ///
    /// The run ends when the frontier is empty and no page is in flight. Every
    /// URL is attempted at most once, so cyclic link graphs terminate.
    pub async fn run(mut self) -> CrawlReport {
        let started = Instant::now();
        let mut report = CrawlReport::new(&self.run_id, &self.request);

        let seed = canonicalize(self.request.seed.clone(), &self.settings.canonical);
        self.ctx.visited.try_visit(&seed);
        let mut frontier = Frontier::seeded(seed);
        let mut workers: JoinSet<PageOutcome> = JoinSet::new();
        let mut capped = false;

        tracing::info!(
            target_name = %self.request.target,
            on_domain = self.request.on_domain,
            "Starting crawl"
        );
        self.transition(RunState::Running);

        loop {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            while workers.len() < self.settings.max_concurrent_fetches {
                if self.settings.max_pages > 0 && report.pages_attempted >= self.settings.max_pages {
                    if !frontier.is_empty() {
                        let dropped = frontier.clear();
                        report.pages_dropped += dropped;
                        tracing::info!(
                            max_pages = self.settings.max_pages,
                            dropped,
                            "Page limit reached, dropping remaining frontier"
                        );
                    }
                    capped = true;
                    break;
                }

                let Some(url) = frontier.pop() else {
                    break;
                };

                report.pages_attempted += 1;
                let ctx = Arc::clone(&self.ctx);
                let span = tracing::debug_span!("page", url = %url);
                workers.spawn(async move { process_page(&ctx, url).await }.instrument(span));
            }

            if workers.is_empty() {
                // Nothing in flight and nothing was spawned, so the frontier is exhausted
                break;
            }

            if frontier.is_empty() || capped {
                self.transition(RunState::Draining);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                joined = workers.join_next() => match joined {
                    Some(Ok(outcome)) => {
                        let discovered = self.accept(outcome, &mut report).await;
                        frontier.extend(discovered);
                        if !frontier.is_empty() && !capped {
                            self.transition(RunState::Running);
                        }
                    }
                    Some(Err(e)) => report.record_panic(&e),
                    None => {}
                },
            }
        }

        if report.cancelled {
            self.transition(RunState::Draining);
            report.pages_dropped += frontier.clear();
            tracing::info!(
                in_flight = workers.len(),
                drain_timeout_secs = self.settings.drain_timeout.as_secs(),
                "Crawl cancelled, draining in-flight pages"
            );

            let drained =
                tokio::time::timeout(self.settings.drain_timeout, self.drain(&mut workers, &mut report))
                    .await;
            if drained.is_err() {
                tracing::warn!(
                    aborted = workers.len(),
                    "Drain timeout elapsed, aborting in-flight pages"
                );
                workers.shutdown().await;
            }
        }

        self.flush(&mut report).await;
        self.transition(RunState::Done);
        report.elapsed_ms = started.elapsed().as_millis();

        tracing::info!(
            pages_attempted = report.pages_attempted,
            pages_indexed = report.pages_indexed,
            fetch_failures = report.fetch_failures,
            index_failures = report.index_failures,
            other_failures = report.other_failures,
            pages_truncated = report.pages_truncated,
            links_rejected = report.links_rejected,
            pages_dropped = report.pages_dropped,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms as u64,
            "Crawl finished"
        );

        report
    }

    /// Waits for every in-flight worker, keeping documents but not enqueueing links
    async fn drain(&mut self, workers: &mut JoinSet<PageOutcome>, report: &mut CrawlReport) {
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => {
                    let discovered = self.accept(outcome, report).await;
                    report.pages_dropped += discovered.len();
                }
                Err(e) => report.record_panic(&e),
            }
        }
    }
}
