use crate::url::domain::same_host;
use std::fmt;
use url::Url;

/// File extensions that never denote an HTML page
const NON_PAGE_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpeg", "jpg", "gif", "tiff", "svg", "webp", "ico", "bmp",
    // audio / video
    "ogg", "mp3", "mp4", "wav", "webm",
    // fonts
    "woff", "woff2", "ttf", "eot", "otf",
    // documents and archives
    "pdf", "zip", "gz",
    // page assets
    "css", "js",
];

/// Policy applied to every discovered link of one crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPolicy {
    /// Host of the seed URL
    pub seed_host: String,

    /// Only follow links whose host equals the seed host
    pub on_domain: bool,
}

impl FilterPolicy {
    pub fn new(seed_host: impl Into<String>, on_domain: bool) -> Self {
        Self {
            seed_host: seed_host.into(),
            on_domain,
        }
    }
}

/// Why a link was kept out of the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Not an absolute http(s) URL with a host
    Malformed,
    /// Path ends in an image, font, document or asset extension
    NonPageResource,
    /// Host differs from the seed host while `on_domain` is set
    OffDomain,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Malformed => "malformed",
            Self::NonPageResource => "non-page resource",
            Self::OffDomain => "off domain",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of filtering a single URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Decides whether a resolved URL may enter the frontier
///
/// Checks, in order:
/// 1. The URL is http(s) and has a host
/// 2. The path does not end in a known non-page extension
/// 3. When `on_domain` is set, the host matches the seed host exactly
///
/// # Examples
///
/// ```
/// use url::Url;
/// use crawl_indexer::url::{filter, FilterPolicy};
///
/// let policy = FilterPolicy::new("example.com", true);
/// let page = Url::parse("https://example.com/page").unwrap();
/// let image = Url::parse("https://example.com/img.png").unwrap();
///
/// assert!(filter(&page, &policy).is_accepted());
/// assert!(!filter(&image, &policy).is_accepted());
/// ```
pub fn filter(url: &Url, policy: &FilterPolicy) -> FilterDecision {
    if (url.scheme() != "http" && url.scheme() != "https") || url.host_str().is_none() {
        return FilterDecision::Reject(RejectReason::Malformed);
    }

    if !is_page_path(url.path()) {
        return FilterDecision::Reject(RejectReason::NonPageResource);
    }

    if policy.on_domain && !same_host(url, &policy.seed_host) {
        return FilterDecision::Reject(RejectReason::OffDomain);
    }

    FilterDecision::Accept
}

/// Returns false when the last path segment carries a non-page extension
pub fn is_page_path(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or("");

    match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            !NON_PAGE_EXTENSIONS.contains(&ext.as_str())
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(on_domain: bool) -> FilterPolicy {
        FilterPolicy::new("example.com", on_domain)
    }

    fn check(raw: &str, policy: &FilterPolicy) -> FilterDecision {
        filter(&Url::parse(raw).unwrap(), policy)
    }

    #[test]
    fn test_accept_page() {
        assert_eq!(
            check("https://example.com/page", &policy(false)),
            FilterDecision::Accept
        );
    }

    #[test]
    fn test_reject_image() {
        assert_eq!(
            check("https://example.com/img.png", &policy(false)),
            FilterDecision::Reject(RejectReason::NonPageResource)
        );
    }

    #[test]
    fn test_reject_extension_case_insensitive() {
        assert!(!check("https://example.com/Report.PDF", &policy(false)).is_accepted());
        assert!(!check("https://example.com/fonts/a.WOFF2", &policy(false)).is_accepted());
    }

    #[test]
    fn test_extension_only_checked_on_path() {
        // The query string is not part of the path
        assert!(check("https://example.com/view?file=a.png", &policy(false)).is_accepted());
        // Nor is the host
        assert!(check("https://images.png.example.com/", &policy(false)).is_accepted());
    }

    #[test]
    fn test_html_extension_accepted() {
        assert!(check("https://example.com/about.html", &policy(false)).is_accepted());
        assert!(check("https://example.com/index.php", &policy(false)).is_accepted());
    }

    #[test]
    fn test_dotfile_segment_accepted() {
        assert!(check("https://example.com/.well-known/", &policy(false)).is_accepted());
    }

    #[test]
    fn test_reject_malformed() {
        assert_eq!(
            check("ftp://example.com/file", &policy(false)),
            FilterDecision::Reject(RejectReason::Malformed)
        );
        assert_eq!(
            check("mailto:someone@example.com", &policy(false)),
            FilterDecision::Reject(RejectReason::Malformed)
        );
    }

    #[test]
    fn test_on_domain_rejects_other_host() {
        assert_eq!(
            check("https://other.com/page", &policy(true)),
            FilterDecision::Reject(RejectReason::OffDomain)
        );
    }

    #[test]
    fn test_on_domain_rejects_subdomain() {
        assert!(!check("https://www.example.com/page", &policy(true)).is_accepted());
    }

    #[test]
    fn test_off_domain_allowed_when_not_restricted() {
        assert!(check("https://other.com/page", &policy(false)).is_accepted());
    }

    #[test]
    fn test_is_page_path() {
        assert!(is_page_path("/"));
        assert!(is_page_path(""));
        assert!(is_page_path("/blog/post"));
        assert!(is_page_path("/v1.2/guide"));
        assert!(!is_page_path("/static/app.js"));
        assert!(!is_page_path("/static/site.css"));
    }
}
