//! Corpus → content-store index builder.
//!
//! Builds a named, queryable content store from a crawled [`Corpus`] and
//! returns its [`StoreId`] handle. The build is all-or-nothing: if any
//! single unit fails to persist, the partially-created store is deleted and
//! the error propagates — unlike the crawler, which is best-effort.

use std::io::Write;

use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use sitescribe_shared::{Corpus, Page, Result, SiteScribeError, StoreId};
use sitescribe_storage::Storage;

/// Builds content stores from corpora.
pub struct IndexBuilder<'a> {
    storage: &'a Storage,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Build a named content store from `corpus`.
    ///
    /// Fails with [`SiteScribeError::EmptyCorpus`] when there is nothing to
    /// index — never silently returns an empty store.
    #[instrument(skip_all, fields(name = %name, pages = corpus.len()))]
    pub async fn build(&self, corpus: &Corpus, name: &str) -> Result<StoreId> {
        // A corpus only admits pages with non-empty text, so emptiness here
        // covers both "no pages" and "all pages were blank".
        if corpus.is_empty() {
            return Err(SiteScribeError::EmptyCorpus);
        }

        let store_id = StoreId::new();
        self.storage.create_store(&store_id, name).await?;

        for page in corpus.iter() {
            if let Err(e) = self.persist_unit(&store_id, page).await {
                warn!(url = %page.url, error = %e, "unit persistence failed, aborting build");
                // No partial index: drop everything registered so far.
                if let Err(cleanup_err) = self.storage.delete_store(&store_id).await {
                    warn!(store = %store_id, error = %cleanup_err, "failed to delete partial store");
                }
                return Err(SiteScribeError::Index(format!(
                    "failed to persist unit for {}: {e}",
                    page.url
                )));
            }
        }

        self.storage.finalize_store(&store_id, corpus.len()).await?;

        info!(store = %store_id, units = corpus.len(), "content store built");
        Ok(store_id)
    }

    /// Persist one page as an indexed unit.
    ///
    /// The text is spooled through a temp file that storage ingests; the
    /// spool is removed on drop whether or not registration succeeds.
    async fn persist_unit(&self, store_id: &StoreId, page: &Page) -> Result<String> {
        let mut spool = NamedTempFile::new()
            .map_err(|e| SiteScribeError::io(std::env::temp_dir(), e))?;
        spool
            .write_all(page.text.as_bytes())
            .and_then(|_| spool.flush())
            .map_err(|e| SiteScribeError::io(spool.path(), e))?;

        self.storage
            .ingest_unit(store_id, &page.url, spool.path())
            .await
    }
}
