//! Shared types, error model, and configuration for SiteScribe.
//!
//! This crate is the foundation depended on by all other SiteScribe crates.
//! It provides:
//! - [`SiteScribeError`] — the unified error type
//! - Domain types ([`Page`], [`Corpus`], [`StoreId`])
//! - Configuration ([`AppConfig`], [`ServerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, DefaultsConfig, ServerConfig, ServerKind, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, SiteScribeError};
pub use types::{Corpus, MAX_PAGE_TEXT_LEN, Page, StoreId};
