//! libSQL-backed collection index and run history.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding the
//! source collection index (one row per collection, with per-stage status
//! flags) and a history of pipeline runs. Stage artifacts themselves live on
//! the filesystem; this database only records where they are and what state
//! each collection is in.
//!
//! **Access rules:**
//! - The pipeline and CLI open read-write via [`Storage::open`]
//! - Reporting tools may open read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, Row, params};

use stacharvest_shared::{
    CollectionFilters, HarvestError, Result, RunId, SourceCollection,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    HarvestError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
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

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(HarvestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collection operations
    // -----------------------------------------------------------------------

    /// Replace the whole collection index with a freshly enumerated one.
    pub async fn reset_collections(&self, collections: &[SourceCollection]) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM collections", params![])
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        for collection in collections {
            self.upsert_collection(collection).await?;
        }
        tracing::info!(count = collections.len(), "collection index reset");
        Ok(())
    }

    /// Insert or update a collection row (keyed by `collection_id`).
    pub async fn upsert_collection(&self, collection: &SourceCollection) -> Result<()> {
        self.check_writable()?;
        let service_json = serde_json::to_string(&collection.service)
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        let targets_json = serde_json::to_string(&collection.targets)
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        let extracted_files_json = serde_json::to_string(&collection.extracted_files)
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO collections (collection_id, service_json, source_schema, target,
                     n_items, targets_json, extracted, extracted_files_json, transformed,
                     stac_dir, ingested, stac_url, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(collection_id) DO UPDATE SET
                   service_json = excluded.service_json,
                   source_schema = excluded.source_schema,
                   target = excluded.target,
                   n_items = excluded.n_items,
                   targets_json = excluded.targets_json,
                   extracted = excluded.extracted,
                   extracted_files_json = excluded.extracted_files_json,
                   transformed = excluded.transformed,
                   stac_dir = excluded.stac_dir,
                   ingested = excluded.ingested,
                   stac_url = excluded.stac_url,
                   updated_at = excluded.updated_at",
                params![
                    collection.collection_id.as_str(),
                    service_json.as_str(),
                    collection.source_schema.as_str(),
                    collection.target.as_deref(),
                    collection.n_items.map(|n| n as i64),
                    targets_json.as_str(),
                    collection.extracted as i64,
                    extracted_files_json.as_str(),
                    collection.transformed as i64,
                    collection.stac_dir.as_deref(),
                    collection.ingested as i64,
                    collection.stac_url.as_deref(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a collection by id.
    pub async fn get_collection(&self, collection_id: &str) -> Result<Option<SourceCollection>> {
        let mut rows = self
            .conn
            .query(
                "SELECT collection_id, service_json, source_schema, target, n_items,
                        targets_json, extracted, extracted_files_json, transformed,
                        stac_dir, ingested, stac_url, updated_at
                 FROM collections WHERE collection_id = ?1",
                params![collection_id],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_collection(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(HarvestError::Storage(e.to_string())),
        }
    }

    /// List collections matching the given filters, ordered by id.
    pub async fn list_collections(
        &self,
        filters: &CollectionFilters,
    ) -> Result<Vec<SourceCollection>> {
        let mut rows = self
            .conn
            .query(
                "SELECT collection_id, service_json, source_schema, target, n_items,
                        targets_json, extracted, extracted_files_json, transformed,
                        stac_dir, ingested, stac_url, updated_at
                 FROM collections ORDER BY collection_id",
                params![],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let collection = row_to_collection(&row)?;
            if filters.matches(&collection) {
                results.push(collection);
            }
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Run history operations
    // -----------------------------------------------------------------------

    /// Record the start of a pipeline stage. Returns the generated run id.
    pub async fn insert_run(&self, collection_id: &str, stage: &str) -> Result<RunId> {
        self.check_writable()?;
        let id = RunId::new();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, collection_id, stage, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), collection_id, stage, now.as_str()],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Record a stage's completion with its stats tally.
    pub async fn finish_run(&self, run_id: &RunId, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id.to_string()],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List run history for a collection. Returns `(stage, started_at,
    /// finished_at, stats_json)` tuples, most recent first.
    pub async fn list_runs(
        &self,
        collection_id: &str,
    ) -> Result<Vec<(String, String, Option<String>, Option<String>)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stage, started_at, finished_at, stats_json
                 FROM runs WHERE collection_id = ?1 ORDER BY started_at DESC",
                params![collection_id],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<String>(0)
                    .map_err(|e| HarvestError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| HarvestError::Storage(e.to_string()))?,
                row.get::<String>(2).ok(),
                row.get::<String>(3).ok(),
            ));
        }
        Ok(results)
    }
}

/// Reconstruct a [`SourceCollection`] from a collections row.
fn row_to_collection(row: &Row) -> Result<SourceCollection> {
    let collection_id: String = row
        .get(0)
        .map_err(|e| HarvestError::Storage(e.to_string()))?;
    let service_json: String = row
        .get(1)
        .map_err(|e| HarvestError::Storage(e.to_string()))?;
    let source_schema_tag: String = row
        .get(2)
        .map_err(|e| HarvestError::Storage(e.to_string()))?;
    let targets_json: String = row
        .get(5)
        .map_err(|e| HarvestError::Storage(e.to_string()))?;
    let extracted_files_json: String = row
        .get(7)
        .map_err(|e| HarvestError::Storage(e.to_string()))?;
    let updated_at: String = row
        .get(12)
        .map_err(|e| HarvestError::Storage(e.to_string()))?;

    let service = serde_json::from_str(&service_json)
        .map_err(|e| HarvestError::Storage(format!("corrupt service_json: {e}")))?;
    let source_schema =
        serde_json::from_str(&format!("\"{source_schema_tag}\""))
            .map_err(|e| HarvestError::Storage(format!("corrupt source_schema: {e}")))?;
    let targets = serde_json::from_str(&targets_json)
        .map_err(|e| HarvestError::Storage(format!("corrupt targets_json: {e}")))?;
    let extracted_files = serde_json::from_str(&extracted_files_json)
        .map_err(|e| HarvestError::Storage(format!("corrupt extracted_files_json: {e}")))?;
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| HarvestError::Storage(format!("corrupt updated_at: {e}")))?
        .with_timezone(&Utc);

    Ok(SourceCollection {
        collection_id,
        service,
        source_schema,
        target: row.get::<String>(3).ok(),
        n_items: row.get::<i64>(4).ok().map(|n| n as u64),
        targets,
        extracted: row.get::<i64>(6).unwrap_or(0) != 0,
        extracted_files,
        transformed: row.get::<i64>(8).unwrap_or(0) != 0,
        stac_dir: row.get::<String>(9).ok(),
        ingested: row.get::<i64>(10).unwrap_or(0) != 0,
        stac_url: row.get::<String>(11).ok(),
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacharvest_shared::{ExternalService, ExternalServiceType};

    fn test_service() -> ExternalService {
        ExternalService {
            title: "PDS ODE API".into(),
            description: "test".into(),
            providers: vec![],
            service_type: ExternalServiceType::PdsOde,
            url: "https://example.org/ode".parse().unwrap(),
            ping_url: None,
            ssys_targets: Some(vec!["Mars".into()]),
            extra_params: serde_json::Map::new(),
        }
    }

    fn tmp_db(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("sh-storage-{tag}-{}", uuid::Uuid::now_v7()))
            .join("index.db")
    }

    #[tokio::test]
    async fn collection_roundtrip() {
        let db_path = tmp_db("roundtrip");
        let storage = Storage::open(&db_path).await.unwrap();

        let mut collection = SourceCollection::new(
            "MRO_HIRISE_RDRV11",
            test_service(),
            Some(12_000),
            vec!["mars".into()],
        );
        collection.extracted = true;
        collection.extracted_files = vec!["MRO_HIRISE_RDRV11_001.json".into()];

        storage.upsert_collection(&collection).await.unwrap();
        let loaded = storage
            .get_collection("MRO_HIRISE_RDRV11")
            .await
            .unwrap()
            .expect("row exists");

        assert_eq!(loaded.collection_id, "MRO_HIRISE_RDRV11");
        assert_eq!(loaded.service.url.as_str(), "https://example.org/ode");
        assert_eq!(loaded.n_items, Some(12_000));
        assert!(loaded.extracted);
        assert!(!loaded.transformed);
        assert_eq!(loaded.extracted_files, vec!["MRO_HIRISE_RDRV11_001.json"]);

        assert!(storage.get_collection("NOPE").await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(db_path.parent().unwrap());
    }

    #[tokio::test]
    async fn upsert_overwrites_status() {
        let db_path = tmp_db("upsert");
        let storage = Storage::open(&db_path).await.unwrap();

        let mut collection =
            SourceCollection::new("ODY_THEMIS_VISGEO", test_service(), None, vec!["mars".into()]);
        storage.upsert_collection(&collection).await.unwrap();

        collection.transformed = true;
        collection.stac_dir = Some("/data/stac/ODY_THEMIS_VISGEO".into());
        storage.upsert_collection(&collection).await.unwrap();

        let loaded = storage
            .get_collection("ODY_THEMIS_VISGEO")
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.transformed);
        assert_eq!(loaded.stac_dir.as_deref(), Some("/data/stac/ODY_THEMIS_VISGEO"));

        let _ = std::fs::remove_dir_all(db_path.parent().unwrap());
    }

    #[tokio::test]
    async fn list_applies_filters() {
        let db_path = tmp_db("filters");
        let storage = Storage::open(&db_path).await.unwrap();

        let mut a = SourceCollection::new("MRO_HIRISE_RDRV11", test_service(), Some(4), vec![
            "mars".into(),
        ]);
        a.extracted = true;
        let b = SourceCollection::new("ODY_THEMIS_VISGEO", test_service(), Some(2), vec![
            "mars".into(),
        ]);
        storage.reset_collections(&[a, b]).await.unwrap();

        let all = storage
            .list_collections(&CollectionFilters::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let extracted_only = storage
            .list_collections(&CollectionFilters {
                extracted: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(extracted_only.len(), 1);
        assert_eq!(extracted_only[0].collection_id, "MRO_HIRISE_RDRV11");

        let by_id = storage
            .list_collections(&CollectionFilters {
                id: Some("themis".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);

        let _ = std::fs::remove_dir_all(db_path.parent().unwrap());
    }

    #[tokio::test]
    async fn reset_replaces_index() {
        let db_path = tmp_db("reset");
        let storage = Storage::open(&db_path).await.unwrap();

        let a = SourceCollection::new("OLD_ONE", test_service(), None, vec![]);
        storage.reset_collections(&[a]).await.unwrap();
        let b = SourceCollection::new("NEW_ONE", test_service(), None, vec![]);
        storage.reset_collections(&[b]).await.unwrap();

        let all = storage
            .list_collections(&CollectionFilters::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].collection_id, "NEW_ONE");

        let _ = std::fs::remove_dir_all(db_path.parent().unwrap());
    }

    #[tokio::test]
    async fn runs_record_stage_history() {
        let db_path = tmp_db("runs");
        let storage = Storage::open(&db_path).await.unwrap();

        let run_id = storage
            .insert_run("MRO_HIRISE_RDRV11", "extract")
            .await
            .unwrap();
        storage
            .finish_run(&run_id, r#"{"succeeded": 4, "skipped_invalid": 0, "failed": 0}"#)
            .await
            .unwrap();

        let runs = storage.list_runs("MRO_HIRISE_RDRV11").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, "extract");
        assert!(runs[0].2.is_some());
        assert!(runs[0].3.as_deref().unwrap().contains("succeeded"));

        let _ = std::fs::remove_dir_all(db_path.parent().unwrap());
    }

    #[tokio::test]
    async fn readonly_mode_rejects_writes() {
        let db_path = tmp_db("readonly");
        // Create and migrate first.
        let storage = Storage::open(&db_path).await.unwrap();
        drop(storage);

        let readonly = Storage::open_readonly(&db_path).await.unwrap();
        let collection = SourceCollection::new("X", test_service(), None, vec![]);
        let err = readonly.upsert_collection(&collection).await.unwrap_err();
        assert!(err.to_string().contains("read-only"));

        let _ = std::fs::remove_dir_all(db_path.parent().unwrap());
    }
}
