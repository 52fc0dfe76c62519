use crate::config::check_index_name;
use crate::request::{Backend, CrawlRequest, CrawlRequestBody, RequestError};
use url::Url;

/// Validates a raw crawl request body
///
/// The backend comes from `type` when present. Otherwise it is inferred from
/// which of `index` / `engine` is set; a body carrying both is ambiguous.
///
/// # Arguments
///
/// * `body` - The deserialized request body
///
/// # Returns
///
/// * `Ok(CrawlRequest)` - All fields present and the URL is an absolute http(s) URL
/// * `Err(RequestError::Invalid)` - Every problem found, in field order
pub fn validate(body: CrawlRequestBody) -> Result<CrawlRequest, RequestError> {
    let mut errors = Vec::new();

    let index = non_empty(body.index);
    let engine = non_empty(body.engine);

    let backend = match non_empty(body.kind) {
        Some(kind) => match kind.parse::<Backend>() {
            Ok(backend) => Some(backend),
            Err(e) => {
                errors.extend(e.messages());
                None
            }
        },
        None => match (&index, &engine) {
            (Some(_), None) => Some(Backend::Elasticsearch),
            (None, Some(_)) => Some(Backend::AppSearch),
            (Some(_), Some(_)) => {
                errors.push(
                    "ambiguous request: both index and engine given without a type".to_string(),
                );
                None
            }
            (None, None) => {
                errors.push("missing Index or Engine in request".to_string());
                None
            }
        },
    };

    let target = backend.and_then(|backend| {
        let target = match backend {
            Backend::Elasticsearch => index,
            Backend::AppSearch => engine,
        };
        match target.as_deref().map(check_index_name) {
            None => errors.push(format!("missing {} in request", backend.target_field())),
            Some(Err(reason)) => errors.push(format!(
                "invalid {} in request: {}",
                backend.target_field(),
                reason
            )),
            Some(Ok(())) => {}
        }
        target
    });

    let url = non_empty(body.url);
    let seed = match url.as_deref() {
        None => {
            errors.push("missing URL in request".to_string());
            None
        }
        Some(raw) => match parse_seed(raw) {
            Ok(seed) => Some(seed),
            Err(message) => {
                errors.push(message);
                None
            }
        },
    };

    match (url, seed, target, backend) {
        (Some(url), Some(seed), Some(target), Some(backend)) if errors.is_empty() => {
            Ok(CrawlRequest {
                url,
                seed,
                target,
                backend,
                on_domain: body.on_domain,
            })
        }
        _ => Err(RequestError::Invalid(errors)),
    }
}

/// The seed must be an absolute http(s) URL with a host
fn parse_seed(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("invalid URL '{}': {}", raw, e))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("invalid URL '{}': scheme must be http or https", raw));
    }

    if url.host_str().is_none() {
        return Err(format!("invalid URL '{}': missing host", raw));
    }

    Ok(url)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
