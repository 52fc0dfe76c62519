use crate::{UrlError, UrlResult};
use url::Url;

/// Schemes that never lead to a crawlable page
const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// How far canonicalization goes beyond fragment stripping
///
/// The URL parser always lowercases http(s) hosts, drops default ports and gives
/// an empty path the root `/`. Everything else is opt-in so that two links are only
/// merged when the configuration says they denote the same page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalPolicy {
    /// Treat `/docs/` and `/docs` as the same page
    pub strip_trailing_slash: bool,

    /// Sort query parameters by key so `?b=2&a=1` equals `?a=1&b=2`
    pub sort_query: bool,
}

/// Resolves `href` against `base` and strips the fragment
///
/// Relative references follow standard URI resolution. An empty or fragment-only
/// href resolves to the base page itself.
///
/// # Arguments
///
/// * `href` - The raw link value as found in the page
/// * `base` - The URL of the page the link was found on
///
/// # Returns
///
/// * `Ok(Url)` - Absolute http(s) URL without a fragment
/// * `Err(UrlError)` - The link cannot be resolved or is not an http(s) link
///
/// # Examples
///
/// ```
/// use url::Url;
/// use crawl_indexer::url::normalize;
///
/// let base = Url::parse("https://example.com/x").unwrap();
/// let url = normalize("/about", &base).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/about");
/// ```
pub fn normalize(href: &str, base: &Url) -> UrlResult<Url> {
    let href = href.trim();

    let lowered = href.to_ascii_lowercase();
    if let Some(scheme) = SKIPPED_SCHEMES.iter().find(|s| lowered.starts_with(*s)) {
        return Err(UrlError::InvalidScheme(scheme.trim_end_matches(':').to_string()));
    }

    let mut url = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Resolves a link and applies the canonicalization policy
pub fn normalize_with(href: &str, base: &Url, policy: &CanonicalPolicy) -> UrlResult<Url> {
    normalize(href, base).map(|url| canonicalize(url, policy))
}

/// Applies the optional canonicalization steps to an already resolved URL
pub fn canonicalize(mut url: Url, policy: &CanonicalPolicy) -> Url {
    url.set_fragment(None);

    if policy.strip_trailing_slash {
        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/');
            let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
            let trimmed = trimmed.to_string();
            url.set_path(&trimmed);
        }
    }

    if policy.sort_query && url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if params.is_empty() {
            url.set_query(None);
        } else {
            params.sort();
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    url
}
