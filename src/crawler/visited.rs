//! Per-run visited set
//!
//! Every crawl run owns a fresh [`VisitedSet`]; nothing is shared between runs.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use url::Url;

/// Concurrency-safe membership set of normalized URLs
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically checks membership and inserts the URL if absent
    ///
    /// Returns `true` only for the first caller. Every later call with the
    /// same URL returns `false` and the caller must not enqueue it.
    pub fn try_visit(&self, url: &Url) -> bool {
        self.try_visit_str(url.as_str())
    }

    pub fn try_visit_str(&self, url: &str) -> bool {
        // A panicking holder cannot leave the set half-updated, so a poisoned
        // lock is still safe to use.
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.insert(url.to_string())
    }

    pub fn contains(&self, url: &Url) -> bool {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.contains(url.as_str())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
