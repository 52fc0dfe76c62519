use url::Url;

/// Returns true when the URL's host equals `host` byte for byte
///
/// No subdomain wildcarding: `blog.example.com` is not the same host as `example.com`.
pub fn same_host(url: &Url, host: &str) -> bool {
    url.host_str() == Some(host)
}
