use std::collections::VecDeque;
use url::Url;

/// Discovered but not yet processed URLs of one crawl run
///
/// Owned by the orchestrator. Entries are only pushed after they won
/// `VisitedSet::try_visit`, so the queue never holds duplicates.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<Url>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frontier holding only the seed
    pub fn seeded(seed: Url) -> Self {
        let mut frontier = Self::new();
        frontier.push(seed);
        frontier
    }

    pub fn push(&mut self, url: Url) {
        self.queue.push_back(url);
    }

    pub fn extend(&mut self, urls: impl IntoIterator<Item = Url>) {
        for url in urls {
            self.push(url);
        }
    }

    /// Next URL in discovery order
    pub fn pop(&mut self) -> Option<Url> {
        self.queue.pop_front()
    }

    /// Empties the queue, returning how many entries were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://example.com").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut frontier = Frontier::seeded(url("/"));
        frontier.extend([url("/a"), url("/b")]);

        assert_eq!(frontier.len(), 3);
        assert_eq!(frontier.pop(), Some(url("/")));
        assert_eq!(frontier.pop(), Some(url("/a")));
        assert_eq!(frontier.pop(), Some(url("/b")));
        assert_eq!(frontier.pop(), None);
    }

    #[test]
    fn test_clear() {
        let mut frontier = Frontier::new();
        frontier.extend([url("/a"), url("/b")]);
        assert_eq!(frontier.clear(), 2);
        assert!(frontier.is_empty());
        assert_eq!(frontier.clear(), 0);
    }
}
