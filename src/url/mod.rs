//! URL handling module
//!
//! This module provides link resolution, canonicalization and the filtering policy
//! that decides which discovered links may enter a crawl frontier.

mod domain;
mod filter;
mod normalize;

// Re-export main functions
pub use domain::same_host;
pub use filter::{filter, is_page_path, FilterDecision, FilterPolicy, RejectReason};
pub use normalize::{canonicalize, normalize, normalize_with, CanonicalPolicy};
