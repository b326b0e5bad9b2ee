//! Bounded, deduplicated site crawler.
//!
//! This crate provides:
//! - [`engine`] — Breadth-first frontier crawler with concurrent fetches
//! - [`extract`] — Readability-style main-content and link extraction
//!
//! The crawler is best-effort: only an unreachable root page is fatal.
//! Every other per-page failure is logged and skipped.

pub mod engine;
pub mod extract;

pub use engine::{CrawlOptions, CrawlSummary, Crawler};
