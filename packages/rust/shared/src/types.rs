//! Core domain types for the SiteScribe pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters of page text retained in the corpus.
/// Longer pages are truncated before indexing.
pub const MAX_PAGE_TEXT_LEN: usize = 20_000;

// ---------------------------------------------------------------------------
// StoreId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying a built content store (time-sortable).
///
/// Opaque handle: created once by the index builder, referenced (never owned)
/// by the capability registry and by stages that query the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub Uuid);

impl StoreId {
    /// Generate a new time-sortable store identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for StoreId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// A fetched page with its extracted main-content text.
///
/// Produced once by the crawler and immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// The page URL (fragment stripped).
    pub url: String,
    /// Readability-filtered main-content text. Never empty inside a corpus.
    pub text: String,
    /// Character offset the text was truncated at, if it exceeded
    /// [`MAX_PAGE_TEXT_LEN`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_at: Option<usize>,
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// The set of fetched, non-empty pages available for indexing.
///
/// Invariants: no two entries share a URL, and every page's text is
/// non-empty. [`Corpus::insert`] enforces both — empty pages are dropped,
/// and the first page stored for a URL wins.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pages: HashMap<String, Page>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a page if it carries text and its URL is not already present.
    /// Returns `true` if the page was added.
    pub fn insert(&mut self, page: Page) -> bool {
        if page.text.trim().is_empty() || self.pages.contains_key(&page.url) {
            return false;
        }
        self.pages.insert(page.url.clone(), page);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.pages.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&Page> {
        self.pages.get(url)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Iterate pages in unspecified order. Corpus membership is not
    /// order-sensitive.
    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_id_roundtrip() {
        let id = StoreId::new();
        let s = id.to_string();
        let parsed: StoreId = s.parse().expect("parse StoreId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn corpus_drops_empty_pages() {
        let mut corpus = Corpus::new();
        let added = corpus.insert(Page {
            url: "https://example.com/empty".into(),
            text: "   ".into(),
            truncated_at: None,
        });
        assert!(!added);
        assert!(corpus.is_empty());
    }

    #[test]
    fn corpus_rejects_duplicate_urls() {
        let mut corpus = Corpus::new();
        assert!(corpus.insert(Page {
            url: "https://example.com/a".into(),
            text: "first".into(),
            truncated_at: None,
        }));
        assert!(!corpus.insert(Page {
            url: "https://example.com/a".into(),
            text: "second".into(),
            truncated_at: None,
        }));
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.get("https://example.com/a").unwrap().text, "first");
    }

    #[test]
    fn page_serialization_skips_absent_truncation() {
        let page = Page {
            url: "https://example.com/".into(),
            text: "hello".into(),
            truncated_at: None,
        };
        let json = serde_json::to_string(&page).expect("serialize");
        assert!(!json.contains("truncated_at"));

        let page = Page {
            truncated_at: Some(20_000),
            ..page
        };
        let json = serde_json::to_string(&page).expect("serialize");
        assert!(json.contains("truncated_at"));
    }
}
