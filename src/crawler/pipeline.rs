//! Per-page work: fetch, extract, build, expand links
//!
//! Every worker task spawned by the orchestrator runs [`process_page`] for exactly
//! one frontier URL and hands a [`PageOutcome`] back through its join handle. Built
//! documents travel back in the outcome; the orchestrator batches them into the sink.

use crate::crawler::extractor::{extract, RenderedPage};
use crate::crawler::fetcher::{fetch, BodyStream, FetchSettings};
use crate::crawler::visited::VisitedSet;
use crate::document::{self, Document};
use crate::request::Backend;
use crate::url::{filter, normalize_with, CanonicalPolicy, FilterDecision, FilterPolicy};
use crate::CrawlerError;
use bytes::Bytes;
use reqwest::Client;
use tokio::sync::mpsc;
use url::Url;

/// Body chunks buffered between the network reader and the extractor
const CHUNK_CHANNEL_CAPACITY: usize = 8;

/// State shared by every worker of one crawl run
pub struct RunContext {
    pub client: Client,
    pub fetch_settings: FetchSettings,
    pub backend: Backend,
    pub target: String,
    pub filter_policy: FilterPolicy,
    pub canonical: CanonicalPolicy,
    pub visited: VisitedSet,
}

/// What one worker reports back to the orchestrator
#[derive(Debug)]
pub struct PageOutcome {
    pub url: Url,

    /// Links that passed the filter and won `try_visit`
    pub discovered: Vec<Url>,

    /// Links that failed normalization or filtering
    pub links_rejected: usize,

    /// The extractor stopped early and the document holds a partial page
    pub truncated: bool,

    /// Document ready for the sink, or why the page never produced one
    pub result: Result<Document, CrawlerError>,
}

impl PageOutcome {
    fn failed(url: Url, error: CrawlerError) -> Self {
        Self {
            url,
            discovered: Vec::new(),
            links_rejected: 0,
            truncated: false,
            result: Err(error),
        }
    }
}

/// Processes a single frontier URL
///
/// Failures are isolated to this page and returned in the outcome; nothing here
/// aborts the run.
pub async fn process_page(ctx: &RunContext, url: Url) -> PageOutcome {
    tracing::debug!(url = %url, "Fetching page");

    let fetched = match fetch(&ctx.client, &url, &ctx.fetch_settings).await {
        Ok(fetched) => fetched,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Fetch failed");
            return PageOutcome::failed(url, e.into());
        }
    };

    let base = fetched.final_url.clone();
    let page = match extract_stream(fetched.body, url.as_str()).await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Page abandoned");
            return PageOutcome::failed(url, e);
        }
    };

    let (discovered, links_rejected) = expand_links(ctx, &page.links, &base);
    if page.truncated {
        tracing::warn!(url = %url, "Page markup was cut short, indexing the partial page");
    }

    let result = match document::build(ctx.backend, &ctx.target, &page) {
        Ok(doc) => {
            tracing::debug!(url = %url, doc_id = %doc.id, "Document built");
            Ok(doc)
        }
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Document serialization failed");
            Err(e.into())
        }
    };

    PageOutcome {
        url,
        discovered,
        links_rejected,
        truncated: page.truncated,
        result,
    }
}

/// Streams a response body through the extractor on a blocking thread
///
/// Chunks travel over a bounded channel, so a slow parser slows the network reader
/// down instead of buffering the whole page.
pub async fn extract_stream(mut body: BodyStream, uri: &str) -> Result<RenderedPage, CrawlerError> {
    let (tx, mut rx) = mpsc::channel::<Bytes>(CHUNK_CHANNEL_CAPACITY);

    let page_uri = uri.to_string();
    let extractor = tokio::task::spawn_blocking(move || {
        extract(std::iter::from_fn(|| rx.blocking_recv()), &page_uri)
    });

    let mut read_error = None;
    loop {
        match body.next_chunk().await {
            Ok(Some(chunk)) => {
                // The extractor only hangs up once it has finished
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                read_error = Some(e);
                break;
            }
        }
    }
    drop(tx);

    let page = extractor.await.map_err(|e| CrawlerError::Extraction {
        url: uri.to_string(),
        message: e.to_string(),
    })?;

    match read_error {
        Some(e) => Err(e.into()),
        None => Ok(page),
    }
}

/// Normalizes, filters and deduplicates the raw links of a page
///
/// Returns the URLs to enqueue and the number of rejected links.
pub fn expand_links(ctx: &RunContext, links: &[String], base: &Url) -> (Vec<Url>, usize) {
    let mut discovered = Vec::new();
    let mut rejected = 0;

    for href in links {
        let url = match normalize_with(href, base, &ctx.canonical) {
            Ok(url) => url,
            Err(e) => {
                tracing::trace!(href = %href, reason = %e, "Link skipped");
                rejected += 1;
                continue;
            }
        };

        if let FilterDecision::Reject(reason) = filter(&url, &ctx.filter_policy) {
            tracing::trace!(url = %url, reason = %reason, "Link rejected");
            rejected += 1;
            continue;
        }

        if ctx.visited.try_visit(&url) {
            discovered.push(url);
        }
    }

    (discovered, rejected)
}
