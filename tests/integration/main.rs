//! Integration tests for crawl-indexer
//!
//! These tests use wiremock for both the crawled sites and the search backends.

mod api_tests;
mod crawl_tests;
mod support;
