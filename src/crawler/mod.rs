//! Crawler module for fetching, extracting and indexing pages
//!
//! This module contains the core crawl pipeline, including:
//! - HTTP fetching with bounded header and body timeouts
//! - Streaming HTML extraction
//! - The per-run visited set and frontier
//! - Crawl orchestration with a bounded worker pool
//! - Launching runs in the background

mod extractor;
mod fetcher;
mod frontier;
mod launcher;
mod orchestrator;
mod pipeline;
mod visited;

pub use extractor::{extract, extract_str, PageMeta, RenderedPage, SOURCE_TAGS};
pub use fetcher::{build_http_client, fetch, is_html, BodyStream, FetchError, FetchSettings, FetchedPage};
pub use frontier::Frontier;
pub use launcher::CrawlLauncher;
pub use orchestrator::{CrawlReport, CrawlSettings, Orchestrator, RunState};
pub use pipeline::{expand_links, extract_stream, process_page, PageOutcome, RunContext};
pub use visited::VisitedSet;

use crate::request::CrawlRequest;
use crate::sink::IndexSink;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl and waits for it
///
/// This is the foreground entry point: it crawls `request.seed` with the given
/// sink and returns the run's report. The HTTP API uses [`CrawlLauncher`] instead.
///
/// # Arguments
///
/// * `request` - The validated crawl request
/// * `client` - The page-fetching client
/// * `sink` - Sink for the request's backend
/// * `settings` - Crawl limits
///
/// # Returns
///
/// The report of the finished run
pub async fn crawl(
    request: CrawlRequest,
    client: Client,
    sink: Arc<dyn IndexSink>,
    settings: CrawlSettings,
) -> CrawlReport {
    Orchestrator::new(request, client, sink, settings, CancellationToken::new())
        .run()
        .await
}
