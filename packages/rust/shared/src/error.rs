//! Error types for SiteScribe.
//!
//! Library crates use [`SiteScribeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SiteScribe operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteScribeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error for a single page or endpoint.
    ///
    /// The crawler contains these locally: a page that fails to fetch is
    /// skipped, never fatal to the crawl.
    #[error("network error: {0}")]
    Network(String),

    /// The root page of a crawl could not be fetched. Fatal to the crawl.
    #[error("root page unreachable: {url}: {message}")]
    RootFetch { url: String, message: String },

    /// Index build requested on a corpus with no usable page text.
    #[error("corpus is empty: no pages with non-empty text to index")]
    EmptyCorpus,

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Index build error. Any single unit failing to persist aborts the
    /// whole build; there is no partial index.
    #[error("index build error: {0}")]
    Index(String),

    /// External capability server error (connect, handshake, cleanup).
    /// Contained by the server manager; degrades the capability set.
    #[error("server '{name}': {message}")]
    Server { name: String, message: String },

    /// A stage was started without one of its required artifacts.
    /// This is a pipeline-configuration error, not a runtime condition.
    #[error("stage '{stage}' is missing required artifact '{artifact}'")]
    MissingArtifact { stage: String, artifact: String },

    /// Generation backend failure that survived the retry budget.
    #[error("generation failed in stage '{stage}': {message}")]
    Generation { stage: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad pipeline plan, invalid input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteScribeError>;

impl SiteScribeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a server error for a named external server.
    pub fn server(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Server {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SiteScribeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = SiteScribeError::MissingArtifact {
            stage: "selection".into(),
            artifact: "draft_2".into(),
        };
        assert!(err.to_string().contains("selection"));
        assert!(err.to_string().contains("draft_2"));
    }

    #[test]
    fn server_error_names_the_server() {
        let err = SiteScribeError::server("docs-search", "connect timed out");
        assert_eq!(err.to_string(), "server 'docs-search': connect timed out");
    }
}
