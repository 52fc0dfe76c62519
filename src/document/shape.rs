//! Backend-specific document bodies

use crate::crawler::RenderedPage;
use serde::Serialize;
use std::collections::BTreeMap;

/// Elasticsearch document: page content nested under `source` and `meta`
#[derive(Debug, Serialize)]
pub struct ElasticsearchBody<'a> {
    pub id: &'a str,
    pub uri: &'a str,
    pub source: &'a BTreeMap<String, Vec<String>>,
    pub meta: ElasticsearchMeta<'a>,
}

#[derive(Debug, Serialize)]
pub struct ElasticsearchMeta<'a> {
    pub ogimage: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub keywords: &'a str,
}

/// App Search document: a single flat object
#[derive(Debug, Serialize)]
pub struct AppSearchBody<'a> {
    pub id: &'a str,
    pub description: &'a str,
    pub uri: &'a str,
    pub source: &'a BTreeMap<String, Vec<String>>,
    pub ogimage: &'a str,
    pub title: &'a str,
    pub keywords: &'a str,
}

impl<'a> ElasticsearchBody<'a> {
    pub fn new(id: &'a str, page: &'a RenderedPage) -> Self {
        Self {
            id,
            uri: &page.uri,
            source: &page.source,
            meta: ElasticsearchMeta {
                ogimage: &page.meta.og_image,
                title: &page.meta.title,
                description: &page.meta.description,
                keywords: &page.meta.keywords,
            },
        }
    }
}

impl<'a> AppSearchBody<'a> {
    pub fn new(id: &'a str, page: &'a RenderedPage) -> Self {
        Self {
            id,
            description: &page.meta.description,
            uri: &page.uri,
            source: &page.source,
            ogimage: &page.meta.og_image,
            title: &page.meta.title,
            keywords: &page.meta.keywords,
        }
    }
}
