//! libSQL content-store layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding named content
//! stores and their discrete indexed units, with FTS5 full-text search over
//! unit content. From the pipeline's perspective a finished store is
//! write-once, read-many: the index builder is the sole writer, stages only
//! query.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};
use sitescribe_shared::{Result, SiteScribeError, StoreId};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// A content-store record.
#[derive(Debug, Clone)]
pub struct StoreRecord {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub unit_count: usize,
}

/// A full-text search hit against a store's units.
#[derive(Debug, Clone)]
pub struct UnitHit {
    /// Source URL of the matched unit.
    pub url: String,
    /// Context snippet around the match.
    pub snippet: String,
    /// FTS5 rank score (lower is better).
    pub score: f64,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SiteScribeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    SiteScribeError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Store operations
    // -----------------------------------------------------------------------

    /// Insert a new, empty content store.
    pub async fn create_store(&self, id: &StoreId, name: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO content_stores (id, name, created_at, unit_count)
                 VALUES (?1, ?2, ?3, 0)",
                params![id.to_string(), name, now.as_str()],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a store record by id.
    pub async fn get_store(&self, id: &StoreId) -> Result<Option<StoreRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, created_at, unit_count FROM content_stores WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(StoreRecord {
                id: row
                    .get::<String>(0)
                    .map_err(|e| SiteScribeError::Storage(e.to_string()))?,
                name: row
                    .get::<String>(1)
                    .map_err(|e| SiteScribeError::Storage(e.to_string()))?,
                created_at: row
                    .get::<String>(2)
                    .map_err(|e| SiteScribeError::Storage(e.to_string()))?,
                unit_count: row.get::<i64>(3).unwrap_or(0) as usize,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(SiteScribeError::Storage(e.to_string())),
        }
    }

    /// Record the final unit count of a completed store.
    pub async fn finalize_store(&self, id: &StoreId, unit_count: usize) -> Result<()> {
        self.conn
            .execute(
                "UPDATE content_stores SET unit_count = ?1 WHERE id = ?2",
                params![unit_count as i64, id.to_string()],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete a store and all of its units.
    ///
    /// Units are removed explicitly so the FTS triggers fire regardless of
    /// foreign-key enforcement settings.
    pub async fn delete_store(&self, id: &StoreId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM index_units WHERE store_id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "DELETE FROM content_stores WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Unit operations
    // -----------------------------------------------------------------------

    /// Register a unit from a spooled text file.
    ///
    /// Reads the spool, hashes the content, and inserts the unit row.
    /// Returns the new unit id. The caller owns the spool file's lifetime.
    pub async fn ingest_unit(
        &self,
        store_id: &StoreId,
        url: &str,
        spool_path: &Path,
    ) -> Result<String> {
        let content = tokio::fs::read_to_string(spool_path)
            .await
            .map_err(|e| SiteScribeError::io(spool_path, e))?;

        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(content.as_bytes());
            format!("{:x}", hasher.finalize())
        };

        let unit_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO index_units (id, store_id, url, content, content_hash, content_len, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    unit_id.as_str(),
                    store_id.to_string(),
                    url,
                    content.as_str(),
                    content_hash.as_str(),
                    content.len() as i64,
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;

        Ok(unit_id)
    }

    /// Count units in a store.
    pub async fn count_units(&self, store_id: &StoreId) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM index_units WHERE store_id = ?1",
                params![store_id.to_string()],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) as usize),
            _ => Ok(0),
        }
    }

    /// List the source URLs of a store's units.
    pub async fn list_unit_urls(&self, store_id: &StoreId) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url FROM index_units WHERE store_id = ?1 ORDER BY url",
                params![store_id.to_string()],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;

        let mut urls = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            urls.push(
                row.get::<String>(0)
                    .map_err(|e| SiteScribeError::Storage(e.to_string()))?,
            );
        }
        Ok(urls)
    }

    // -----------------------------------------------------------------------
    // FTS search
    // -----------------------------------------------------------------------

    /// Full-text search across a store's units.
    pub async fn search_units(
        &self,
        store_id: &StoreId,
        query: &str,
        limit: u32,
    ) -> Result<Vec<UnitHit>> {
        let mut rows = self
            .conn
            .query(
                "SELECT u.url, snippet(units_fts, 0, '[', ']', '…', 12), rank
                 FROM units_fts fts
                 JOIN index_units u ON u.rowid = fts.rowid
                 WHERE units_fts MATCH ?1 AND u.store_id = ?2
                 ORDER BY rank
                 LIMIT ?3",
                params![query, store_id.to_string(), limit],
            )
            .await
            .map_err(|e| SiteScribeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let url: String = row
                .get(0)
                .map_err(|e| SiteScribeError::Storage(e.to_string()))?;
            let snippet: String = row.get(1).unwrap_or_default();
            let score: f64 = row.get(2).unwrap_or(0.0);
            results.push(UnitHit {
                url,
                snippet,
                score,
            });
        }
        Ok(results)
    }
}
