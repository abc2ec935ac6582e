//! Knowledge store: the append-only sink for condensed research output.
//!
//! [`KnowledgeStore`] is the contract the research loop writes through.
//! Two implementations ship here:
//! - [`Storage`]: a libSQL database file shared across process restarts
//! - [`MemoryStore`]: an in-process store for tests and throwaway runs
//!
//! **Access rules:**
//! - `deepresearch run` / `cluster`: read-write via [`Storage::open`]
//! - `deepresearch db show`: read-only via [`Storage::open_readonly`]

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use deepresearch_shared::{KnowledgeId, KnowledgeItem, ResearchError, Result, RunId};
use libsql::{Connection, Database, params};

pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Append-only, surrogate-keyed collection of knowledge items.
///
/// Ids start at 1 on an empty store and increase by one per insert. Writes
/// are durable when `insert` returns; a failed write is an error, never a
/// silent drop.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Persist `item` and return its assigned id.
    async fn insert(&self, item: &KnowledgeItem) -> Result<KnowledgeId>;

    /// All items in insertion order.
    async fn scan(&self) -> Result<Vec<(KnowledgeId, KnowledgeItem)>>;

    /// All synopsis strings in insertion order.
    async fn summaries(&self) -> Result<Vec<String>> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .map(|(_, item)| item.summary)
            .collect())
    }

    /// Number of stored items.
    async fn count(&self) -> Result<usize> {
        Ok(self.scan().await?.len())
    }

    /// Assign a cluster label. The only mutation an item ever sees.
    async fn set_cluster_label(&self, id: KnowledgeId, label: i64) -> Result<()>;

    /// Record the start of a research run. No-op unless the store keeps history.
    async fn record_run_start(&self, _run_id: &RunId, _topic: &str, _max_depth: u32) -> Result<()> {
        Ok(())
    }

    /// Record the end of a research run with its stats.
    async fn record_run_finish(&self, _run_id: &RunId, _stats_json: &str) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// libSQL storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A row of the `research_runs` table.
#[derive(Debug, Clone)]
pub struct ResearchRun {
    pub id: String,
    pub topic: String,
    pub max_depth: u32,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ResearchError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(ResearchError::storage)?;

        let conn = db.connect().map_err(ResearchError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ResearchError::storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(ResearchError::storage)?;

        let conn = db.connect().map_err(ResearchError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
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
                    ResearchError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
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

    /// Whether every known migration has been applied.
    pub async fn is_current(&self) -> bool {
        self.schema_version().await >= migrations::latest_version()
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ResearchError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Knowledge queries
    // -----------------------------------------------------------------------

    /// Items produced at a given depth, in insertion order.
    pub async fn list_by_depth(&self, depth: u32) -> Result<Vec<(KnowledgeId, KnowledgeItem)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, url, raw_text, summary, cluster_label, depth
                 FROM knowledge WHERE depth = ?1 ORDER BY id",
                params![depth],
            )
            .await
            .map_err(ResearchError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(ResearchError::storage)? {
            results.push(row_to_knowledge(&row)?);
        }
        Ok(results)
    }

    /// Delete every knowledge item. Ids are not reused afterwards.
    pub async fn reset(&self) -> Result<u64> {
        self.check_writable()?;
        let deleted = self
            .conn
            .execute("DELETE FROM knowledge", params![])
            .await
            .map_err(ResearchError::storage)?;
        tracing::warn!(deleted, "knowledge table cleared");
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<ResearchRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, topic, max_depth, started_at, finished_at, stats_json
                 FROM research_runs ORDER BY started_at DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(ResearchError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(ResearchError::storage)? {
            results.push(ResearchRun {
                id: row.get::<String>(0).map_err(ResearchError::storage)?,
                topic: row.get::<String>(1).map_err(ResearchError::storage)?,
                max_depth: row.get::<u32>(2).map_err(ResearchError::storage)?,
                started_at: row.get::<String>(3).map_err(ResearchError::storage)?,
                finished_at: row.get::<String>(4).ok(),
                stats_json: row.get::<String>(5).ok(),
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl KnowledgeStore for Storage {
    async fn insert(&self, item: &KnowledgeItem) -> Result<KnowledgeId> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO knowledge (title, url, raw_text, summary, cluster_label, depth, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 RETURNING id",
                params![
                    item.title.as_str(),
                    item.url.as_str(),
                    item.raw_text.as_str(),
                    item.summary.as_str(),
                    item.cluster_label,
                    item.depth,
                    now.as_str(),
                ],
            )
            .await
            .map_err(ResearchError::storage)?;

        let row = rows
            .next()
            .await
            .map_err(ResearchError::storage)?
            .ok_or_else(|| ResearchError::Storage("insert returned no id".into()))?;
        let id = KnowledgeId(row.get::<i64>(0).map_err(ResearchError::storage)?);
        tracing::debug!(%id, depth = item.depth, "stored knowledge item");
        Ok(id)
    }

    async fn scan(&self) -> Result<Vec<(KnowledgeId, KnowledgeItem)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, url, raw_text, summary, cluster_label, depth
                 FROM knowledge ORDER BY id",
                params![],
            )
            .await
            .map_err(ResearchError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(ResearchError::storage)? {
            results.push(row_to_knowledge(&row)?);
        }
        Ok(results)
    }

    async fn summaries(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query("SELECT summary FROM knowledge ORDER BY id", params![])
            .await
            .map_err(ResearchError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(ResearchError::storage)? {
            results.push(row.get::<String>(0).unwrap_or_default());
        }
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM knowledge", params![])
            .await
            .map_err(ResearchError::storage)?;

        match rows.next().await.map_err(ResearchError::storage)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(ResearchError::storage)? as usize),
            None => Ok(0),
        }
    }

    async fn set_cluster_label(&self, id: KnowledgeId, label: i64) -> Result<()> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE knowledge SET cluster_label = ?1 WHERE id = ?2",
                params![label, id.0],
            )
            .await
            .map_err(ResearchError::storage)?;
        if updated == 0 {
            return Err(ResearchError::Storage(format!("no knowledge item with id {id}")));
        }
        Ok(())
    }

    async fn record_run_start(&self, run_id: &RunId, topic: &str, max_depth: u32) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO research_runs (id, topic, max_depth, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![run_id.to_string(), topic, i64::from(max_depth), now.as_str()],
            )
            .await
            .map_err(ResearchError::storage)?;
        Ok(())
    }

    async fn record_run_finish(&self, run_id: &RunId, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE research_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id.to_string()],
            )
            .await
            .map_err(ResearchError::storage)?;
        Ok(())
    }
}

/// Convert a database row to an `(id, item)` pair.
fn row_to_knowledge(row: &libsql::Row) -> Result<(KnowledgeId, KnowledgeItem)> {
    let id = row.get::<i64>(0).map_err(ResearchError::storage)?;
    Ok((
        KnowledgeId(id),
        KnowledgeItem {
            title: row.get::<String>(1).unwrap_or_default(),
            url: row.get::<String>(2).unwrap_or_default(),
            raw_text: row.get::<String>(3).unwrap_or_default(),
            summary: row.get::<String>(4).unwrap_or_default(),
            cluster_label: row.get::<i64>(5).ok(),
            depth: row.get::<u32>(6).unwrap_or(0),
        },
    ))
}
