//! Streaming HTML extraction
//!
//! Pages are pushed through a `lol_html` rewriter chunk by chunk, so a document is
//! never held in memory as a whole. Handlers collect:
//! - every `<a href>` target, for frontier expansion
//! - the `<title>` text
//! - `<h1>`-`<h4>` and `<p>` text grouped by tag, in encounter order
//! - `<meta>` description, keywords and `og:image`
//!
//! Malformed or truncated markup never fails a page: on a rewriter error the
//! extractor stops and returns what it collected so far.

use lol_html::{element, text, HtmlRewriter, Settings};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Tags whose text is captured into [`RenderedPage::source`]
pub const SOURCE_TAGS: [&str; 5] = ["h1", "h2", "h3", "h4", "p"];

/// Selected `<meta>` fields and the page title
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub og_image: String,
}

/// Structured content extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    /// Canonical URI of the page
    pub uri: String,

    /// Raw `href` values in document order
    pub links: Vec<String>,

    /// Text per tag name; one entry per element
    pub source: BTreeMap<String, Vec<String>>,

    pub meta: PageMeta,

    /// Set when the rewriter hit an unrecoverable error
    pub truncated: bool,
}

#[derive(Default)]
struct Collected {
    links: Vec<String>,
    title: Option<String>,
    titles_seen: usize,
    source: BTreeMap<&'static str, Vec<String>>,
    meta: PageMeta,
}

/// Extracts a page from a sequence of body chunks
///
/// # Arguments
///
/// * `chunks` - Body chunks in arrival order
/// * `uri` - Canonical URI recorded on the page
///
/// # Returns
///
/// The extracted page. Extraction errors are logged and yield a partial page
/// with `truncated` set.
pub fn extract<I, B>(chunks: I, uri: &str) -> RenderedPage
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let collected = Rc::new(RefCell::new(Collected::default()));
    let mut truncated = false;

    {
        let mut handlers = vec![
            element!("a[href]", {
                let collected = Rc::clone(&collected);
                move |el| {
                    if let Some(href) = el.get_attribute("href") {
                        collected.borrow_mut().links.push(decode(&href));
                    }
                    Ok(())
                }
            }),
            element!("title", {
                let collected = Rc::clone(&collected);
                move |_| {
                    let mut c = collected.borrow_mut();
                    c.titles_seen += 1;
                    if c.title.is_none() {
                        c.title = Some(String::new());
                    }
                    Ok(())
                }
            }),
            text!("title", {
                let collected = Rc::clone(&collected);
                move |t| {
                    let mut c = collected.borrow_mut();
                    // Only the first <title>; inline <svg><title> labels come later
                    if c.titles_seen == 1 {
                        if let Some(title) = c.title.as_mut() {
                            title.push_str(t.as_str());
                        }
                    }
                    Ok(())
                }
            }),
            element!("meta", {
                let collected = Rc::clone(&collected);
                move |el| {
                    let Some(content) = el.get_attribute("content") else {
                        return Ok(());
                    };
                    let name = el.get_attribute("name").unwrap_or_default();
                    let property = el.get_attribute("property").unwrap_or_default();

                    let mut c = collected.borrow_mut();
                    // Later tags override earlier ones
                    if name.eq_ignore_ascii_case("description") {
                        c.meta.description = decode(&content);
                    } else if name.eq_ignore_ascii_case("keywords") {
                        c.meta.keywords = decode(&content);
                    }
                    if property.eq_ignore_ascii_case("og:image") {
                        c.meta.og_image = decode(&content);
                    }
                    Ok(())
                }
            }),
        ];

        for tag in SOURCE_TAGS {
            handlers.push(element!(tag, {
                let collected = Rc::clone(&collected);
                move |_| {
                    collected
                        .borrow_mut()
                        .source
                        .entry(tag)
                        .or_default()
                        .push(String::new());
                    Ok(())
                }
            }));
            handlers.push(text!(tag, {
                let collected = Rc::clone(&collected);
                move |t| {
                    let mut c = collected.borrow_mut();
                    if let Some(entry) = c.source.get_mut(tag).and_then(|v| v.last_mut()) {
                        entry.push_str(t.as_str());
                    }
                    Ok(())
                }
            }));
        }

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            |_: &[u8]| {},
        );

        for chunk in chunks {
            if let Err(e) = rewriter.write(chunk.as_ref()) {
                tracing::warn!(url = %uri, error = %e, "HTML extraction stopped early");
                truncated = true;
                break;
            }
        }

        if !truncated {
            if let Err(e) = rewriter.end() {
                tracing::warn!(url = %uri, error = %e, "HTML extraction could not finish");
                truncated = true;
            }
        }
    }

    let collected = collected.take();
    RenderedPage {
        uri: uri.to_string(),
        links: collected.links,
        source: collected
            .source
            .into_iter()
            .filter_map(|(tag, entries)| {
                let texts: Vec<String> = entries
                    .iter()
                    .map(|raw| clean_text(raw))
                    .filter(|text| !text.is_empty())
                    .collect();
                (!texts.is_empty()).then(|| (tag.to_string(), texts))
            })
            .collect(),
        meta: PageMeta {
            title: collected.title.map(|t| clean_text(&t)).unwrap_or_default(),
            ..collected.meta
        },
        truncated,
    }
}

/// Extracts a page from an in-memory document
pub fn extract_str(html: &str, uri: &str) -> RenderedPage {
    extract(std::iter::once(html.as_bytes()), uri)
}

/// Decodes entities and collapses runs of whitespace
fn clean_text(raw: &str) -> String {
    decode(raw).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}
